use super::*;
use crate::ir::Callee;

fn call(
    m: &mut Module,
    f: FuncId,
    b: crate::ir::BlockId,
    callee: FuncId,
    ty: Option<Type>,
    args: Vec<Operand>,
) -> ValueId {
    m.push_inst(
        f,
        b,
        ty,
        InstKind::Call {
            callee: Callee::Direct(callee),
            args,
        },
    )
}

#[test]
fn malloc_creates_a_fresh_object() {
    let mut m = Module::new();
    let malloc = declare(&mut m, "malloc", vec![int()], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = call(&mut m, f, b, malloc, Some(ptr(int())), vec![Operand::Const(Constant::Int(16))]);
    let q = call(&mut m, f, b, malloc, Some(ptr(int())), vec![Operand::Const(Constant::Int(16))]);

    let a = analyze(&m);
    assert_eq!(a.points_to(p), Some(vec![p]));
    assert_eq!(a.points_to(q), Some(vec![q]));
    // Distinct allocation sites never alias.
    assert_eq!(a.alias(p, q), AliasKind::No);
    let sites = a.all_allocation_sites();
    assert!(sites.contains(&p) && sites.contains(&q));
}

#[test]
fn memcpy_copies_contents_and_returns_dest() {
    let mut m = Module::new();
    let malloc = declare(&mut m, "malloc", vec![int()], Some(ptr(int())));
    let memcpy = declare(
        &mut m,
        "memcpy",
        vec![ptr(int()), ptr(int()), int()],
        Some(ptr(int())),
    );
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = call(&mut m, f, b, malloc, Some(ptr(int())), vec![Operand::Const(Constant::Int(16))]);
    let src = alloca(&mut m, f, b, ptr(int()));
    let dst = alloca(&mut m, f, b, ptr(int()));
    m.push_inst(
        f,
        b,
        None,
        InstKind::Store {
            ptr: value_op(src),
            value: value_op(p),
        },
    );
    let q = call(
        &mut m,
        f,
        b,
        memcpy,
        Some(ptr(ptr(int()))),
        vec![value_op(dst), value_op(src), Operand::Const(Constant::Int(16))],
    );
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: value_op(dst) });

    let a = analyze(&m);
    // The copied slot now reaches the heap object p does.
    assert!(a.points_to(r).unwrap().contains(&p));
    // The call returns its destination argument.
    assert_eq!(a.points_to(q), Some(vec![dst]));
    assert_eq!(a.alias(q, dst), AliasKind::Must);
}

#[test]
fn realloc_of_null_keeps_the_argument() {
    let mut m = Module::new();
    let realloc = declare(&mut m, "realloc", vec![ptr(int()), int()], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = call(
        &mut m,
        f,
        b,
        realloc,
        Some(ptr(int())),
        vec![Operand::Const(Constant::Null), Operand::Const(Constant::Int(8))],
    );

    let a = analyze(&m);
    assert_eq!(pts_nodes(&a, p), vec![NULL_OBJ]);
}

#[test]
fn realloc_of_pointer_is_a_fresh_object() {
    let mut m = Module::new();
    let malloc = declare(&mut m, "malloc", vec![int()], Some(ptr(int())));
    let realloc = declare(&mut m, "realloc", vec![ptr(int()), int()], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = call(&mut m, f, b, malloc, Some(ptr(int())), vec![Operand::Const(Constant::Int(8))]);
    let q = call(
        &mut m,
        f,
        b,
        realloc,
        Some(ptr(int())),
        vec![value_op(p), Operand::Const(Constant::Int(16))],
    );

    let a = analyze(&m);
    assert_eq!(a.points_to(q), Some(vec![q]));
}

#[test]
fn posix_memalign_stores_through_its_out_param() {
    let mut m = Module::new();
    let pma = declare(
        &mut m,
        "posix_memalign",
        vec![ptr(ptr(int())), int(), int()],
        Some(int()),
    );
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let out = alloca(&mut m, f, b, ptr(int()));
    let c = call(
        &mut m,
        f,
        b,
        pma,
        Some(int()),
        vec![
            value_op(out),
            Operand::Const(Constant::Int(16)),
            Operand::Const(Constant::Int(64)),
        ],
    );
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: value_op(out) });

    let a = analyze(&m);
    assert_eq!(a.points_to(r), Some(vec![c]));
}

#[test]
fn strtol_stores_its_cursor() {
    let mut m = Module::new();
    let strtol = declare(
        &mut m,
        "strtol",
        vec![ptr(int()), ptr(ptr(int())), int()],
        Some(int()),
    );
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let buf = alloca(&mut m, f, b, ptr(int()));
    let endp = alloca(&mut m, f, b, ptr(int()));
    call(
        &mut m,
        f,
        b,
        strtol,
        Some(int()),
        vec![value_op(buf), value_op(endp), Operand::Const(Constant::Int(10))],
    );
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: value_op(buf) });

    let a = analyze(&m);
    assert!(a.points_to(r).unwrap().contains(&endp));
}

#[test]
fn noop_functions_add_nothing() {
    let mut m = Module::new();
    let free = declare(&mut m, "free", vec![ptr(int())], None);
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());
    call(&mut m, f, b, free, None, vec![value_op(p)]);

    let a = analyze(&m);
    // free() must not pollute its argument.
    assert_eq!(a.points_to(p), Some(vec![p]));
}

#[test]
fn unknown_external_pollutes_everything() {
    let mut m = Module::new();
    let mystery = declare(&mut m, "mystery", vec![ptr(int())], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());
    let c = call(&mut m, f, b, mystery, Some(ptr(int())), vec![value_op(p)]);

    let a = analyze(&m);
    assert_eq!(pts_nodes(&a, c), vec![UNIVERSAL_OBJ]);
    // The argument itself is polluted too.
    assert_eq!(pts_nodes(&a, p), vec![UNIVERSAL_OBJ]);
}

#[test]
fn ret_arg0_links_result_to_argument() {
    let mut m = Module::new();
    let strchr = declare(&mut m, "strchr", vec![ptr(int()), int()], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let s = alloca(&mut m, f, b, int());
    let c = call(
        &mut m,
        f,
        b,
        strchr,
        Some(ptr(int())),
        vec![value_op(s), Operand::Const(Constant::Int(47))],
    );

    let a = analyze(&m);
    assert_eq!(a.points_to(c), Some(vec![s]));
    assert_eq!(a.alias(c, s), AliasKind::Must);
}

use super::*;

#[test]
fn alias_is_symmetric() {
    let mut m = Module::new();
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());
    let q = alloca(&mut m, f, b, int());
    let r = m.push_inst(
        f,
        b,
        Some(ptr(int())),
        InstKind::Select {
            lhs: value_op(p),
            rhs: value_op(q),
        },
    );

    let a = analyze(&m);
    let values = [p, q, r];
    for &v1 in &values {
        assert_eq!(a.alias(v1, v1), AliasKind::Must);
        for &v2 in &values {
            assert_eq!(a.alias(v1, v2), a.alias(v2, v1));
        }
    }
}

#[test]
fn unknown_values_may_alias() {
    let mut m = Module::new();
    let f = m.add_function("f", vec![int()], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());

    let a = analyze(&m);
    // An integer parameter has no pointer node.
    assert_eq!(a.alias(p, ValueId::Param(f, 0)), AliasKind::May);
    assert_eq!(a.points_to(ValueId::Param(f, 0)), None);
}

#[test]
fn constant_memory() {
    let mut m = Module::new();
    let k = m.add_global_full("k", int(), Some(Constant::Int(7)), true);
    let w = m.add_global("w", int(), Some(Constant::Int(7)));
    let callee = m.add_function("callee", vec![], None);
    let cb = m.add_block(callee);
    m.push_inst(callee, cb, None, InstKind::Ret { value: None });

    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let pk = m.push_inst(
        f,
        b,
        Some(ptr(int())),
        InstKind::BitCast {
            value: global_op(k),
        },
    );
    let pw = m.push_inst(
        f,
        b,
        Some(ptr(int())),
        InstKind::BitCast {
            value: global_op(w),
        },
    );
    let pa = alloca(&mut m, f, b, int());
    let pf = m.push_inst(
        f,
        b,
        Some(ptr(int())),
        InstKind::BitCast {
            value: Operand::Const(Constant::Func(callee)),
        },
    );
    // Takes callee's address so it gets an object node.
    m.push_inst(
        f,
        b,
        None,
        InstKind::Store {
            ptr: value_op(pa),
            value: value_op(pf),
        },
    );

    let a = analyze(&m);
    assert!(a.points_to_constant_memory(pk));
    assert!(!a.points_to_constant_memory(pw));
    assert!(!a.points_to_constant_memory(pa));
    assert!(a.points_to_constant_memory(pf));
    // Unknown pointers are never constant.
    assert!(!a.points_to_constant_memory(ValueId::Param(f, 0)));
}

#[test]
fn allocation_sites_cover_globals_functions_and_heap() {
    let mut m = Module::new();
    let g = m.add_global("g", int(), Some(Constant::Int(0)));
    let malloc = declare(&mut m, "malloc", vec![int()], Some(ptr(int())));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());
    let h = m.push_inst(
        f,
        b,
        Some(ptr(int())),
        InstKind::Call {
            callee: crate::ir::Callee::Direct(malloc),
            args: vec![Operand::Const(Constant::Int(8))],
        },
    );
    // f's own address escapes through a store.
    let slot = alloca(&mut m, f, b, ptr(int()));
    m.push_inst(
        f,
        b,
        None,
        InstKind::Store {
            ptr: value_op(slot),
            value: Operand::Const(Constant::Func(f)),
        },
    );

    let a = analyze(&m);
    let sites = a.all_allocation_sites();
    assert!(sites.contains(&ValueId::Global(g)));
    assert!(sites.contains(&p));
    assert!(sites.contains(&h));
    assert!(sites.contains(&ValueId::Func(f)));
}

#[test]
fn points_to_skips_anonymous_objects() {
    let mut m = Module::new();
    let pair = m.add_struct("pair", vec![ptr(int()), ptr(int())]);
    let g = m.add_global("g", Type::Struct(pair), None);
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let q = m.push_inst(
        f,
        b,
        Some(ptr(ptr(int()))),
        InstKind::BitCast {
            value: Operand::Const(Constant::Gep {
                base: Box::new(Constant::Global(g)),
                field: 1,
            }),
        },
    );

    let a = analyze(&m);
    // q addresses the second field object, which has no back-reference.
    let og = object_of(&a, ValueId::Global(g));
    assert_eq!(pts_nodes(&a, q), vec![a.factory().offset_object(og, 1)]);
    assert_eq!(a.points_to(q), Some(vec![]));
}

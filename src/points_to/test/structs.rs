use super::*;

#[test]
fn field_sensitive_global_initializer() {
    let mut m = Module::new();
    let pair = m.add_struct("pair", vec![ptr(int()), ptr(int())]);
    let a_g = m.add_global("a", int(), Some(Constant::Int(0)));
    let b_g = m.add_global("b", int(), Some(Constant::Int(0)));
    let g = m.add_global(
        "g",
        Type::Struct(pair),
        Some(Constant::Struct(
            pair,
            vec![Constant::Global(a_g), Constant::Global(b_g)],
        )),
    );

    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    // q = &g.1 via a constant expression; r = *q
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
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: value_op(q) });

    let a = analyze(&m);
    let og = object_of(&a, ValueId::Global(g));
    let oa = object_of(&a, ValueId::Global(a_g));
    let ob = object_of(&a, ValueId::Global(b_g));

    // Each expanded field holds exactly its initializer's target.
    let field0 = a.points_to_set(og).unwrap();
    assert!(field0.has(oa) && !field0.has(ob));
    let field1 = a.points_to_set(a.factory().offset_object(og, 1)).unwrap();
    assert!(field1.has(ob) && !field1.has(oa));

    // The GEP constant addresses the second field object.
    assert_eq!(pts_nodes(&a, q), vec![a.factory().offset_object(og, 1)]);
    assert_eq!(a.points_to(r), Some(vec![ValueId::Global(b_g)]));
}

#[test]
fn nested_struct_expansion() {
    let mut m = Module::new();
    let inner = m.add_struct("inner", vec![int(), ptr(int())]);
    let outer = m.add_struct("outer", vec![ptr(int()), Type::Struct(inner), ptr(int())]);
    let t = m.add_global("t", int(), Some(Constant::Int(0)));
    let u = m.add_global("u", int(), Some(Constant::Int(0)));
    let w = m.add_global("w", int(), Some(Constant::Int(0)));
    // outer expands to [ptr, int, ptr, ptr]: field 1 lands at offset 1,
    // field 2 at offset 3.
    let g = m.add_global(
        "g",
        Type::Struct(outer),
        Some(Constant::Struct(
            outer,
            vec![
                Constant::Global(t),
                Constant::Struct(inner, vec![Constant::Int(7), Constant::Global(u)]),
                Constant::Global(w),
            ],
        )),
    );

    let a = analyze(&m);
    let og = object_of(&a, ValueId::Global(g));
    let factory = a.factory();
    assert!(a.points_to_set(og).unwrap().has(object_of(&a, ValueId::Global(t))));
    assert!(a
        .points_to_set(factory.offset_object(og, 2))
        .unwrap()
        .has(object_of(&a, ValueId::Global(u))));
    assert!(a
        .points_to_set(factory.offset_object(og, 3))
        .unwrap()
        .has(object_of(&a, ValueId::Global(w))));
}

#[test]
fn empty_aggregate_points_at_null() {
    let mut m = Module::new();
    let unit = m.add_struct("unit", vec![]);
    let e = m.add_global("e", Type::Struct(unit), None);
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, int());
    let q = m.push_inst(
        f,
        b,
        Some(ptr(Type::Struct(unit))),
        InstKind::BitCast {
            value: global_op(e),
        },
    );

    let a = analyze(&m);
    assert_eq!(pts_nodes(&a, ValueId::Global(e)), vec![NULL_OBJ]);
    assert_eq!(a.points_to(q), Some(vec![]));
    assert_eq!(a.alias(q, p), AliasKind::No);
}

#[test]
fn zero_initialized_global() {
    let mut m = Module::new();
    let g = m.add_global("g", ptr(int()), Some(Constant::Null));
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: global_op(g) });

    let a = analyze(&m);
    let og = object_of(&a, ValueId::Global(g));
    // The null-object link contributes nothing observable: the slot's
    // contents stay empty, and so does anything loaded from it.
    let contents = a.points_to_set(og).map_or(0, |s| s.size());
    assert_eq!(contents, 0);
    assert_eq!(a.points_to(r), Some(vec![]));
}

#[test]
fn undef_initializers_add_nothing() {
    let mut m = Module::new();
    let pair = m.add_struct("pair", vec![ptr(int()), ptr(int())]);
    let a_g = m.add_global("a", int(), Some(Constant::Int(0)));
    let u = m.add_global("u", ptr(int()), Some(Constant::Undef));
    let w = m.add_global("w", Type::Struct(pair), Some(Constant::Undef));
    let h = m.add_global(
        "h",
        Type::Struct(pair),
        Some(Constant::Struct(
            pair,
            vec![Constant::Undef, Constant::Global(a_g)],
        )),
    );

    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: global_op(u) });

    let a = analyze(&m);
    // Unlike an undef operand (which resolves like null), an undef
    // initializer contributes no constraint at all: the slots stay empty.
    let slot_size = |n: NodeIndex| a.points_to_set(n).map_or(0, |s| s.size());
    let ou = object_of(&a, ValueId::Global(u));
    assert_eq!(slot_size(ou), 0);
    let ow = object_of(&a, ValueId::Global(w));
    assert_eq!(slot_size(ow), 0);
    assert_eq!(slot_size(a.factory().offset_object(ow, 1)), 0);
    assert_eq!(a.points_to(r), Some(vec![]));

    // An undef field stays empty while its sibling is initialized.
    let oh = object_of(&a, ValueId::Global(h));
    assert_eq!(slot_size(oh), 0);
    let field1 = a.points_to_set(a.factory().offset_object(oh, 1)).unwrap();
    assert!(field1.has(object_of(&a, ValueId::Global(a_g))));
}

#[test]
fn uninitialized_global_is_universal() {
    let mut m = Module::new();
    let g = m.add_global("ext", ptr(int()), None);
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let r = m.push_inst(f, b, Some(ptr(int())), InstKind::Load { ptr: global_op(g) });

    let a = analyze(&m);
    assert_eq!(pts_nodes(&a, r), vec![UNIVERSAL_OBJ]);
}

#[test]
fn array_fields_collapse_to_one_element() {
    let mut m = Module::new();
    // struct { int*[4]; int* } expands to two scalar fields.
    let s = m.add_struct(
        "s",
        vec![Type::Array(Box::new(ptr(int())), 4), ptr(int())],
    );
    let a_g = m.add_global("a", int(), Some(Constant::Int(0)));
    let b_g = m.add_global("b", int(), Some(Constant::Int(0)));
    let c_g = m.add_global("c", int(), Some(Constant::Int(0)));
    let g = m.add_global(
        "g",
        Type::Struct(s),
        Some(Constant::Struct(
            s,
            vec![
                Constant::Array(vec![Constant::Global(a_g), Constant::Global(b_g)]),
                Constant::Global(c_g),
            ],
        )),
    );

    let a = analyze(&m);
    let og = object_of(&a, ValueId::Global(g));
    let elem = a.points_to_set(og).unwrap();
    // Both array initializers overlay the single element object.
    assert!(elem.has(object_of(&a, ValueId::Global(a_g))));
    assert!(elem.has(object_of(&a, ValueId::Global(b_g))));
    let field1 = a.points_to_set(a.factory().offset_object(og, 1)).unwrap();
    assert!(field1.has(object_of(&a, ValueId::Global(c_g))));
    assert!(!field1.has(object_of(&a, ValueId::Global(a_g))));
}

#[test]
fn gep_instruction_is_first_field() {
    let mut m = Module::new();
    let pair = m.add_struct("pair", vec![ptr(int()), ptr(int())]);
    let f = m.add_function("f", vec![], None);
    let b = m.add_block(f);
    let p = alloca(&mut m, f, b, Type::Struct(pair));
    // A non-constant field selection keeps the base object run.
    let q = m.push_inst(
        f,
        b,
        Some(ptr(ptr(int()))),
        InstKind::Gep {
            base: value_op(p),
            field: 1,
        },
    );

    let a = analyze(&m);
    assert_eq!(a.alias(p, q), AliasKind::Must);
}

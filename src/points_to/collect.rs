use etrace::some_or;
use rustc_hash::FxHashMap;

use crate::ir::{
    Callee, Constant, FuncId, InstId, InstKind, Module, Operand, Type, ValueId,
};

use super::node::{NodeFactory, NULL_OBJ, NULL_PTR, UNIVERSAL_OBJ, UNIVERSAL_PTR};
use super::structs::StructOracle;
use super::{AnalysisError, Constraint, ConstraintKind, NodeIndex, INVALID_INDEX};

/// Walks the module once and turns it into nodes plus a constraint vector.
/// Node identification runs in phases so that forward references (globals
/// used before their initializers, values flowing backwards through phis)
/// are already registered when constraints mention them.
pub struct Collector<'a> {
    pub(crate) module: &'a Module,
    pub(crate) oracle: &'a StructOracle,
    pub(crate) factory: &'a mut NodeFactory,
    pub(crate) constraints: Vec<Constraint>,
    /// Synthetic value nodes for field-offset constant expressions, keyed
    /// by the object node they address.
    gep_values: FxHashMap<NodeIndex, NodeIndex>,
    address_taken: Vec<FuncId>,
}

pub fn collect(
    module: &Module,
    oracle: &StructOracle,
    factory: &mut NodeFactory,
) -> Result<Vec<Constraint>, AnalysisError> {
    let mut address_taken: Vec<_> = module.address_taken_functions().into_iter().collect();
    address_taken.sort_unstable();
    let mut collector = Collector {
        module,
        oracle,
        factory,
        constraints: vec![],
        gep_values: FxHashMap::default(),
        address_taken,
    };
    collector.run()?;
    Ok(collector.constraints)
}

impl<'a> Collector<'a> {
    fn run(&mut self) -> Result<(), AnalysisError> {
        // The universal set points to itself (both the pointer and the
        // object), anything can be stored into it, and the null pointer
        // points to the null object.
        self.emit(ConstraintKind::AddrOf, UNIVERSAL_PTR, UNIVERSAL_OBJ);
        self.emit(ConstraintKind::AddrOf, UNIVERSAL_OBJ, UNIVERSAL_OBJ);
        self.emit(ConstraintKind::Store, UNIVERSAL_OBJ, UNIVERSAL_OBJ);
        self.emit(ConstraintKind::AddrOf, NULL_PTR, NULL_OBJ);

        self.phase_globals();
        self.phase_signatures();
        self.phase_instruction_values();
        self.phase_initializers()?;
        self.phase_bodies()
    }

    #[inline]
    pub(crate) fn emit(&mut self, kind: ConstraintKind, dest: NodeIndex, src: NodeIndex) {
        self.constraints.push(Constraint::new(kind, dest, src));
    }

    /// Phase 1: a value node and an object run for every global, and for
    /// every address-taken function.
    fn phase_globals(&mut self) {
        for g in self.module.global_ids() {
            let vid = ValueId::Global(g);
            let val = self.factory.create_value(Some(vid));
            let size = self.oracle.expanded_size_of(&self.module.global(g).ty);
            if size == 0 {
                // An empty aggregate owns no storage.
                self.emit(ConstraintKind::AddrOf, val, NULL_OBJ);
            } else {
                let obj = self.create_object_run(Some(vid), size);
                self.emit(ConstraintKind::AddrOf, val, obj);
            }
        }
        for i in 0..self.address_taken.len() {
            let f = self.address_taken[i];
            let vid = ValueId::Func(f);
            let val = self.factory.create_value(Some(vid));
            let obj = self.factory.create_object(Some(vid));
            self.emit(ConstraintKind::AddrOf, val, obj);
        }
    }

    fn create_object_run(&mut self, base_ref: Option<ValueId>, size: usize) -> NodeIndex {
        let obj = self.factory.create_object(base_ref);
        for _ in 1..size {
            self.factory.create_object(None);
        }
        obj
    }

    /// Phase 2: return, vararg and formal-parameter nodes for definitions.
    fn phase_signatures(&mut self) {
        for f in self.module.func_ids() {
            let func = self.module.function(f);
            if func.is_declaration() {
                continue;
            }
            if func.returns_pointer() {
                self.factory.create_return(f);
            }
            if func.is_variadic {
                self.factory.create_vararg(f);
            }
            for (i, param) in func.params.iter().enumerate() {
                if param.is_pointer() {
                    self.factory.create_value(Some(ValueId::Param(f, i as u32)));
                }
            }
        }
    }

    /// Phase 3: a value node for every pointer-typed instruction, before
    /// any instruction semantics are examined (phis observe values that
    /// are defined later).
    fn phase_instruction_values(&mut self) {
        for f in self.module.func_ids() {
            let func = self.module.function(f);
            for block in &func.blocks {
                for &inst_id in &block.insts {
                    if func.inst(inst_id).has_pointer_result() {
                        self.factory.create_value(Some(ValueId::Inst(f, inst_id)));
                    }
                }
            }
        }
    }

    /// Phase 4: global initializers. Globals whose definitive initializer
    /// lives elsewhere are linked to the universal object.
    fn phase_initializers(&mut self) -> Result<(), AnalysisError> {
        for g in self.module.global_ids() {
            let global = self.module.global(g);
            let obj = self.factory.object_node_for(ValueId::Global(g));
            if obj == INVALID_INDEX {
                // Empty aggregate; nothing to initialize.
                continue;
            }
            match &global.init {
                Some(init) => {
                    let ty = global.ty.clone();
                    self.add_initializer(obj, &ty, init)?;
                }
                None => self.emit(ConstraintKind::Copy, obj, UNIVERSAL_OBJ),
            }
        }
        Ok(())
    }

    fn add_initializer(
        &mut self,
        obj: NodeIndex,
        ty: &Type,
        c: &Constant,
    ) -> Result<(), AnalysisError> {
        if ty.is_pointer() {
            return match c {
                Constant::Null => {
                    self.emit(ConstraintKind::Copy, obj, NULL_OBJ);
                    Ok(())
                }
                Constant::Undef => Ok(()),
                _ if c.is_pointer() => {
                    let target = self.constant_object_target(c)?;
                    self.emit(ConstraintKind::AddrOf, obj, target);
                    Ok(())
                }
                _ => Err(AnalysisError::UnhandledConstant(format!(
                    "initializer {c:?} in pointer slot"
                ))),
            };
        }
        match c {
            // Zero-initialized aggregate.
            Constant::Null => {
                self.emit(ConstraintKind::Copy, obj, NULL_OBJ);
                Ok(())
            }
            Constant::Undef | Constant::Int(_) | Constant::PtrToInt(_) => Ok(()),
            Constant::Struct(sid, fields) => {
                let mut ty = ty;
                while let Type::Array(elem, _) = ty {
                    ty = elem.as_ref();
                }
                if *ty != Type::Struct(*sid) {
                    return Err(AnalysisError::UnhandledConstant(format!(
                        "struct initializer for non-struct slot {ty:?}"
                    )));
                }
                let field_tys = self.module.struct_def(*sid).fields.clone();
                for (j, field_init) in fields.iter().enumerate() {
                    let offset = self.oracle.info(*sid).offset(j);
                    let field_obj = self.factory.offset_object(obj, offset);
                    self.add_initializer(field_obj, &field_tys[j], field_init)?;
                }
                Ok(())
            }
            Constant::Array(elems) => {
                // An array is one element of its element type; every
                // initializer element overlays the same object run.
                let elem_ty = match ty {
                    Type::Array(elem, _) => elem.as_ref().clone(),
                    _ => {
                        return Err(AnalysisError::UnhandledConstant(format!(
                            "array initializer for non-array slot {ty:?}"
                        )))
                    }
                };
                for e in elems {
                    self.add_initializer(obj, &elem_ty, e)?;
                }
                Ok(())
            }
            _ => Err(AnalysisError::UnhandledConstant(format!(
                "initializer {c:?} in non-pointer slot"
            ))),
        }
    }

    /// Phase 5: one constraint emission per instruction.
    fn phase_bodies(&mut self) -> Result<(), AnalysisError> {
        for f in self.module.func_ids() {
            let func = self.module.function(f);
            for block in &func.blocks {
                for &inst_id in &block.insts {
                    self.transfer_inst(f, inst_id)?;
                }
            }
        }
        Ok(())
    }

    fn transfer_inst(&mut self, f: FuncId, inst_id: InstId) -> Result<(), AnalysisError> {
        let func = self.module.function(f);
        let inst = func.inst(inst_id).clone();
        let is_ptr = inst.has_pointer_result();
        let dest = if is_ptr {
            let d = self.factory.value_node_for(ValueId::Inst(f, inst_id));
            assert_ne!(d, INVALID_INDEX);
            Some(d)
        } else {
            None
        };

        match &inst.kind {
            InstKind::Alloca => {
                let dest = some_or!(dest, return Ok(()));
                let pointee = inst.ty.as_ref().and_then(Type::pointee);
                let pointee = some_or!(pointee, return Ok(()));
                let size = self.oracle.expanded_size_of(pointee);
                if size == 0 {
                    self.emit(ConstraintKind::AddrOf, dest, NULL_OBJ);
                } else {
                    let obj = self.create_object_run(Some(ValueId::Inst(f, inst_id)), size);
                    self.emit(ConstraintKind::AddrOf, dest, obj);
                }
            }
            InstKind::Load { ptr } => {
                let dest = some_or!(dest, return Ok(()));
                let src = self.node_of_operand(ptr)?;
                self.emit(ConstraintKind::Load, dest, src);
            }
            InstKind::Store { ptr, value } => {
                if self.operand_is_pointer(value) {
                    let dest = self.node_of_operand(ptr)?;
                    let src = self.node_of_operand(value)?;
                    self.emit(ConstraintKind::Store, dest, src);
                }
            }
            InstKind::Gep { base, .. } => {
                // Pointer-to-first-field: field selection on non-constant
                // bases collapses onto the base object run.
                let dest = some_or!(dest, return Ok(()));
                let src = self.node_of_operand(base)?;
                self.emit(ConstraintKind::Copy, dest, src);
            }
            InstKind::Phi { incoming } => {
                let dest = some_or!(dest, return Ok(()));
                for op in incoming {
                    let src = self.node_of_operand(op)?;
                    self.emit(ConstraintKind::Copy, dest, src);
                }
            }
            InstKind::BitCast { value } => {
                let dest = some_or!(dest, return Ok(()));
                let src = self.node_of_operand(value)?;
                self.emit(ConstraintKind::Copy, dest, src);
            }
            InstKind::Select { lhs, rhs } => {
                let dest = some_or!(dest, return Ok(()));
                let l = self.node_of_operand(lhs)?;
                let r = self.node_of_operand(rhs)?;
                self.emit(ConstraintKind::Copy, dest, l);
                self.emit(ConstraintKind::Copy, dest, r);
            }
            InstKind::VaArg => {
                let dest = some_or!(dest, return Ok(()));
                let va = self.factory.vararg_node_for(f);
                if va == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "va_arg in non-variadic function {}",
                        func.name
                    )));
                }
                self.emit(ConstraintKind::Copy, dest, va);
            }
            InstKind::IntToPtr { value } => {
                let dest = some_or!(dest, return Ok(()));
                match self.int_to_ptr_source(value) {
                    Some(src_op) => {
                        let src_op = src_op.clone();
                        let src = self.node_of_operand(&src_op)?;
                        self.emit(ConstraintKind::Copy, dest, src);
                    }
                    None => self.emit(ConstraintKind::Copy, dest, UNIVERSAL_PTR),
                }
            }
            InstKind::PtrToInt { .. } | InstKind::Add { .. } => {}
            InstKind::Ret { value } => {
                if func.returns_pointer() {
                    let op = some_or!(value, return Ok(()));
                    if self.operand_is_pointer(op) {
                        let ret = self.factory.return_node_for(f);
                        assert_ne!(ret, INVALID_INDEX);
                        let src = self.node_of_operand(op)?;
                        self.emit(ConstraintKind::Copy, ret, src);
                    }
                }
            }
            InstKind::Call { callee, args } => {
                self.transfer_call(f, inst_id, dest, callee, args)?;
            }
            InstKind::LandingPad | InstKind::Resume | InstKind::AtomicRmw { .. } => {
                return Err(AnalysisError::UnsupportedInstruction(format!(
                    "{:?}",
                    inst.kind
                )));
            }
        }
        Ok(())
    }

    /// `inttoptr` looks through `ptrtoint x` and `ptrtoint x + _` so that
    /// round-tripped pointers keep their identity; everything else decays
    /// to the universal pointer.
    fn int_to_ptr_source<'b>(&'b self, op: &'b Operand) -> Option<&'b Operand> {
        let Operand::Value(ValueId::Inst(f, id)) = op else {
            return None;
        };
        match &self.module.function(*f).inst(*id).kind {
            InstKind::PtrToInt { value } => Some(value),
            InstKind::Add { lhs, rhs } => self
                .int_to_ptr_source(lhs)
                .or_else(|| self.int_to_ptr_source(rhs)),
            _ => None,
        }
    }

    fn transfer_call(
        &mut self,
        f: FuncId,
        inst_id: InstId,
        dest: Option<NodeIndex>,
        callee: &Callee,
        args: &[Operand],
    ) -> Result<(), AnalysisError> {
        match callee {
            Callee::Direct(target) => {
                let tf = self.module.function(*target);
                if tf.is_declaration() {
                    let callsite = ValueId::Inst(f, inst_id);
                    if !self.add_constraints_for_external_library(
                        f, callsite, dest, *target, args,
                    )? {
                        let err = AnalysisError::UnknownLibraryFunction(
                            self.module.function(*target).name.clone(),
                        );
                        tracing::warn!("{err}; assuming the worst");
                        self.pollute_call(dest, args)?;
                    }
                } else {
                    self.direct_call_constraints(dest, *target, args)?;
                }
            }
            Callee::Indirect(_) => {
                let targets: Vec<_> = self
                    .address_taken
                    .iter()
                    .copied()
                    .filter(|&t| {
                        let tf = self.module.function(t);
                        !tf.is_declaration() && tf.arity_compatible(args.len())
                    })
                    .collect();
                if targets.is_empty() {
                    self.pollute_call(dest, args)?;
                } else {
                    for t in targets {
                        self.direct_call_constraints(dest, t, args)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn direct_call_constraints(
        &mut self,
        dest: Option<NodeIndex>,
        target: FuncId,
        args: &[Operand],
    ) -> Result<(), AnalysisError> {
        let tf = self.module.function(target);
        if tf.returns_pointer() {
            if let Some(dest) = dest {
                let ret = self.factory.return_node_for(target);
                assert_ne!(ret, INVALID_INDEX);
                self.emit(ConstraintKind::Copy, dest, ret);
            }
        }
        let num_params = tf.params.len();
        let param_ptr: Vec<bool> = tf.params.iter().map(Type::is_pointer).collect();
        let is_variadic = tf.is_variadic;
        for (i, arg) in args.iter().enumerate() {
            if i < num_params {
                if !param_ptr[i] {
                    continue;
                }
                let formal = self.factory.value_node_for(ValueId::Param(target, i as u32));
                assert_ne!(formal, INVALID_INDEX);
                if self.operand_is_pointer(arg) {
                    let actual = self.node_of_operand(arg)?;
                    self.emit(ConstraintKind::Copy, formal, actual);
                } else {
                    self.emit(ConstraintKind::Copy, formal, UNIVERSAL_PTR);
                }
            } else if is_variadic && self.operand_is_pointer(arg) {
                let va = self.factory.vararg_node_for(target);
                assert_ne!(va, INVALID_INDEX);
                let actual = self.node_of_operand(arg)?;
                self.emit(ConstraintKind::Copy, va, actual);
            }
        }
        Ok(())
    }

    /// The conservative treatment of a call we know nothing about: its
    /// result and every pointer argument may be anything.
    pub(crate) fn pollute_call(
        &mut self,
        dest: Option<NodeIndex>,
        args: &[Operand],
    ) -> Result<(), AnalysisError> {
        if let Some(dest) = dest {
            self.emit(ConstraintKind::Copy, dest, UNIVERSAL_PTR);
        }
        for arg in args {
            if self.operand_is_pointer(arg) {
                let a = self.node_of_operand(arg)?;
                self.emit(ConstraintKind::Copy, a, UNIVERSAL_PTR);
            }
        }
        Ok(())
    }

    pub(crate) fn operand_is_pointer(&self, op: &Operand) -> bool {
        match op {
            Operand::Value(v) => self
                .module
                .value_type(*v)
                .is_some_and(|t| t.is_pointer()),
            Operand::Const(c) => c.is_pointer(),
        }
    }

    pub(crate) fn node_of_operand(&mut self, op: &Operand) -> Result<NodeIndex, AnalysisError> {
        match op {
            Operand::Value(v) => {
                let n = self.factory.value_node_for(*v);
                if n == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "no value node for {v:?}"
                    )));
                }
                Ok(n)
            }
            Operand::Const(c) => self.constant_value_node(c),
        }
    }

    /// A constant in value position. Field-selecting constant expressions
    /// get a synthetic value node pointing at the addressed field object.
    fn constant_value_node(&mut self, c: &Constant) -> Result<NodeIndex, AnalysisError> {
        match c {
            Constant::Gep { .. } => {
                let (base, offset, _) = self.const_base_and_offset(c)?;
                if base == UNIVERSAL_OBJ {
                    return Ok(UNIVERSAL_PTR);
                }
                if base == NULL_OBJ {
                    return Ok(NULL_PTR);
                }
                let target = self.factory.offset_object(base, offset);
                if let Some(&n) = self.gep_values.get(&target) {
                    return Ok(n);
                }
                let n = self.factory.create_value(None);
                self.emit(ConstraintKind::AddrOf, n, target);
                self.gep_values.insert(target, n);
                Ok(n)
            }
            Constant::BitCast(inner) => self.constant_value_node(inner),
            _ => {
                let n = self.factory.value_node_for_constant(c)?;
                if n == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "no node for constant {c:?}"
                    )));
                }
                Ok(n)
            }
        }
    }

    /// A constant in object position (what its address refers to).
    pub(crate) fn constant_object_target(
        &mut self,
        c: &Constant,
    ) -> Result<NodeIndex, AnalysisError> {
        match c {
            Constant::Gep { .. } | Constant::BitCast(_) => {
                let (base, offset, _) = self.const_base_and_offset(c)?;
                if base <= NULL_OBJ {
                    return Ok(base);
                }
                Ok(self.factory.offset_object(base, offset))
            }
            _ => {
                let n = self.factory.object_node_for_constant(c)?;
                if n == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "no object node for constant {c:?}"
                    )));
                }
                Ok(n)
            }
        }
    }

    /// Resolves a pointer constant to its base object node plus the
    /// expanded field offset, tracking the pointee type through nested
    /// `Gep`/`BitCast` layers.
    fn const_base_and_offset(
        &mut self,
        c: &Constant,
    ) -> Result<(NodeIndex, usize, Type), AnalysisError> {
        match c {
            Constant::Global(g) => {
                let n = self.factory.object_node_for(ValueId::Global(*g));
                if n == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "no object node for global {g:?}"
                    )));
                }
                Ok((n, 0, self.module.global(*g).ty.clone()))
            }
            Constant::Func(f) => {
                let n = self.factory.object_node_for(ValueId::Func(*f));
                if n == INVALID_INDEX {
                    return Err(AnalysisError::InternalInvariant(format!(
                        "no object node for function {f:?}"
                    )));
                }
                Ok((n, 0, Type::Int))
            }
            Constant::Null | Constant::Undef => Ok((NULL_OBJ, 0, Type::Int)),
            Constant::IntToPtr(_) => Ok((UNIVERSAL_OBJ, 0, Type::Int)),
            Constant::BitCast(inner) => self.const_base_and_offset(inner),
            Constant::Gep { base, field } => {
                let (node, offset, ty) = self.const_base_and_offset(base)?;
                let mut elem_ty = &ty;
                while let Type::Array(elem, _) = elem_ty {
                    elem_ty = elem.as_ref();
                }
                match elem_ty {
                    Type::Struct(sid) => {
                        let info = self.oracle.info(*sid);
                        if *field as usize >= info.size() {
                            return Err(AnalysisError::UnhandledConstant(format!(
                                "field {field} out of range for struct {}",
                                self.module.struct_def(*sid).name
                            )));
                        }
                        let field_ty = self.module.struct_def(*sid).fields[*field as usize].clone();
                        Ok((node, offset + info.offset(*field as usize), field_ty))
                    }
                    _ if *field == 0 => Ok((node, offset, ty.clone())),
                    _ => Err(AnalysisError::UnhandledConstant(format!(
                        "field selection on non-aggregate {elem_ty:?}"
                    ))),
                }
            }
            _ => Err(AnalysisError::UnhandledConstant(format!("{c:?}"))),
        }
    }

    pub(crate) fn create_heap_object(&mut self, callsite: ValueId, pointee: Option<&Type>) -> NodeIndex {
        let size = pointee.map_or(1, |t| self.oracle.expanded_size_of(t)).max(1);
        self.create_object_run(Some(callsite), size)
    }
}

//! A small typed SSA IR: the input the pointer analysis runs on.
//!
//! Modules own struct types, globals and functions; functions own an
//! instruction arena referenced by basic blocks. Constants are structural
//! and resolved recursively by the analysis, so they carry no identity of
//! their own.

use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Identity of an SSA value. Constants are not values: they are structural
/// and appear inline inside operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueId {
    Global(GlobalId),
    Func(FuncId),
    Param(FuncId, u32),
    Inst(FuncId, InstId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Ptr(Box<Type>),
    Struct(StructId),
    Array(Box<Type>, u64),
}

impl Type {
    pub fn ptr_to(pointee: Type) -> Type {
        Type::Ptr(Box::new(pointee))
    }

    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    #[inline]
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(t) => Some(t),
            _ => None,
        }
    }
}

/// A structural constant. `Gep` selects original field `field` of the
/// struct its base points into; nested bases accumulate.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Undef,
    Int(i64),
    Global(GlobalId),
    Func(FuncId),
    Gep { base: Box<Constant>, field: u32 },
    BitCast(Box<Constant>),
    IntToPtr(Box<Constant>),
    PtrToInt(Box<Constant>),
    Struct(StructId, Vec<Constant>),
    Array(Vec<Constant>),
}

impl Constant {
    /// True for constants that stand where a scalar pointer is expected.
    pub fn is_pointer(&self) -> bool {
        match self {
            Constant::Null
            | Constant::Undef
            | Constant::Global(_)
            | Constant::Func(_)
            | Constant::Gep { .. }
            | Constant::IntToPtr(_) => true,
            Constant::BitCast(c) => c.is_pointer(),
            Constant::Int(_) | Constant::PtrToInt(_) | Constant::Struct(..) | Constant::Array(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

#[derive(Debug, Clone)]
pub enum Callee {
    Direct(FuncId),
    Indirect(Operand),
}

#[derive(Debug, Clone)]
pub enum InstKind {
    /// Stack allocation; the allocated type is the pointee of the result type.
    Alloca,
    Load { ptr: Operand },
    Store { ptr: Operand, value: Operand },
    Gep { base: Operand, field: u32 },
    Phi { incoming: Vec<Operand> },
    BitCast { value: Operand },
    Select { lhs: Operand, rhs: Operand },
    VaArg,
    IntToPtr { value: Operand },
    PtrToInt { value: Operand },
    Add { lhs: Operand, rhs: Operand },
    Ret { value: Option<Operand> },
    Call { callee: Callee, args: Vec<Operand> },
    LandingPad,
    Resume,
    AtomicRmw { ptr: Operand, value: Operand },
}

#[derive(Debug, Clone)]
pub struct Inst {
    /// Result type; `None` for instructions that produce no value.
    pub ty: Option<Type>,
    pub kind: InstKind,
}

impl Inst {
    #[inline]
    pub fn has_pointer_result(&self) -> bool {
        self.ty.as_ref().is_some_and(Type::is_pointer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Type>,
    pub ret_ty: Option<Type>,
    pub is_variadic: bool,
    pub blocks: Vec<Block>,
    /// Instruction arena; blocks reference into it by `InstId`.
    pub insts: Vec<Inst>,
}

impl Function {
    /// A function without a body is a declaration (external or intrinsic).
    #[inline]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    #[inline]
    pub fn returns_pointer(&self) -> bool {
        self.ret_ty.as_ref().is_some_and(Type::is_pointer)
    }

    /// Arity compatibility for indirect-call resolution: exact match, or a
    /// variadic callee absorbing extra actuals.
    pub fn arity_compatible(&self, num_args: usize) -> bool {
        if self.is_variadic {
            num_args >= self.params.len()
        } else {
            num_args == self.params.len()
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    /// `None` means the definitive initializer lives in another module.
    pub init: Option<Constant>,
    pub is_const: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub structs: Vec<StructDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn add_struct(&mut self, name: &str, fields: Vec<Type>) -> StructId {
        let id = StructId(self.structs.len() as u32);
        self.structs.push(StructDef {
            name: name.to_string(),
            fields,
        });
        id
    }

    pub fn add_global(&mut self, name: &str, ty: Type, init: Option<Constant>) -> GlobalId {
        self.add_global_full(name, ty, init, false)
    }

    pub fn add_global_full(
        &mut self,
        name: &str,
        ty: Type,
        init: Option<Constant>,
        is_const: bool,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.to_string(),
            ty,
            init,
            is_const,
        });
        id
    }

    pub fn add_function(
        &mut self,
        name: &str,
        params: Vec<Type>,
        ret_ty: Option<Type>,
    ) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_string(),
            params,
            ret_ty,
            is_variadic: false,
            blocks: vec![],
            insts: vec![],
        });
        id
    }

    pub fn add_variadic_function(
        &mut self,
        name: &str,
        params: Vec<Type>,
        ret_ty: Option<Type>,
    ) -> FuncId {
        let id = self.add_function(name, params, ret_ty);
        self.functions[id.0 as usize].is_variadic = true;
        id
    }

    pub fn add_block(&mut self, f: FuncId) -> BlockId {
        let func = &mut self.functions[f.0 as usize];
        let id = BlockId(func.blocks.len() as u32);
        func.blocks.push(Block::default());
        id
    }

    /// Appends an instruction to a block and returns its SSA identity.
    pub fn push_inst(
        &mut self,
        f: FuncId,
        b: BlockId,
        ty: Option<Type>,
        kind: InstKind,
    ) -> ValueId {
        let func = &mut self.functions[f.0 as usize];
        let id = InstId(func.insts.len() as u32);
        func.insts.push(Inst { ty, kind });
        func.blocks[b.0 as usize].insts.push(id);
        ValueId::Inst(f, id)
    }

    #[inline]
    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0 as usize]
    }

    #[inline]
    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    #[inline]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> {
        (0..self.globals.len() as u32).map(GlobalId)
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    /// The type of an SSA value, if it has one. Globals and functions are
    /// pointers to their storage.
    pub fn value_type(&self, v: ValueId) -> Option<Type> {
        match v {
            ValueId::Global(g) => Some(Type::ptr_to(self.global(g).ty.clone())),
            ValueId::Func(_) => Some(Type::ptr_to(Type::Int)),
            ValueId::Param(f, i) => self.function(f).params.get(i as usize).cloned(),
            ValueId::Inst(f, i) => self.function(f).inst(i).ty.clone(),
        }
    }

    /// Functions whose address escapes into data: referenced from an
    /// initializer or from any operand position other than a direct callee.
    pub fn address_taken_functions(&self) -> FxHashSet<FuncId> {
        let mut taken = FxHashSet::default();
        for global in &self.globals {
            if let Some(init) = &global.init {
                collect_fn_refs(init, &mut taken);
            }
        }
        for func in &self.functions {
            for inst in &func.insts {
                match &inst.kind {
                    InstKind::Call { callee, args } => {
                        if let Callee::Indirect(op) = callee {
                            operand_fn_refs(op, &mut taken);
                        }
                        for arg in args {
                            operand_fn_refs(arg, &mut taken);
                        }
                    }
                    InstKind::Load { ptr } => operand_fn_refs(ptr, &mut taken),
                    InstKind::Store { ptr, value } => {
                        operand_fn_refs(ptr, &mut taken);
                        operand_fn_refs(value, &mut taken);
                    }
                    InstKind::Gep { base, .. } => operand_fn_refs(base, &mut taken),
                    InstKind::Phi { incoming } => {
                        for op in incoming {
                            operand_fn_refs(op, &mut taken);
                        }
                    }
                    InstKind::BitCast { value }
                    | InstKind::IntToPtr { value }
                    | InstKind::PtrToInt { value } => operand_fn_refs(value, &mut taken),
                    InstKind::Select { lhs, rhs } | InstKind::Add { lhs, rhs } => {
                        operand_fn_refs(lhs, &mut taken);
                        operand_fn_refs(rhs, &mut taken);
                    }
                    InstKind::Ret { value: Some(op) } => operand_fn_refs(op, &mut taken),
                    InstKind::AtomicRmw { ptr, value } => {
                        operand_fn_refs(ptr, &mut taken);
                        operand_fn_refs(value, &mut taken);
                    }
                    InstKind::Alloca
                    | InstKind::VaArg
                    | InstKind::Ret { value: None }
                    | InstKind::LandingPad
                    | InstKind::Resume => {}
                }
            }
        }
        taken
    }
}

fn operand_fn_refs(op: &Operand, taken: &mut FxHashSet<FuncId>) {
    match op {
        Operand::Value(ValueId::Func(f)) => {
            taken.insert(*f);
        }
        Operand::Const(c) => collect_fn_refs(c, taken),
        Operand::Value(_) => {}
    }
}

fn collect_fn_refs(c: &Constant, taken: &mut FxHashSet<FuncId>) {
    match c {
        Constant::Func(f) => {
            taken.insert(*f);
        }
        Constant::Gep { base, .. } => collect_fn_refs(base, taken),
        Constant::BitCast(c) | Constant::IntToPtr(c) | Constant::PtrToInt(c) => {
            collect_fn_refs(c, taken)
        }
        Constant::Struct(_, fields) => {
            for f in fields {
                collect_fn_refs(f, taken);
            }
        }
        Constant::Array(elems) => {
            for e in elems {
                collect_fn_refs(e, taken);
            }
        }
        Constant::Null | Constant::Undef | Constant::Int(_) | Constant::Global(_) => {}
    }
}

use crate::ir::{Constant, FuncId, InstKind, Module, Operand, Type, ValueId};

use super::node::{NULL_OBJ, UNIVERSAL_OBJ};
use super::{AliasKind, AnalysisConfig, Andersen, NodeIndex};

mod extlib;
mod queries;
mod structs;

fn int() -> Type {
    Type::Int
}

fn ptr(pointee: Type) -> Type {
    Type::ptr_to(pointee)
}

fn analyze(module: &Module) -> Andersen<'_> {
    Andersen::run(module, AnalysisConfig::default()).unwrap()
}

fn analyze_with(module: &Module, config: AnalysisConfig) -> Andersen<'_> {
    Andersen::run(module, config).unwrap()
}

/// The solved points-to set of an SSA value, as raw node indices.
fn pts_nodes(analysis: &Andersen<'_>, v: ValueId) -> Vec<NodeIndex> {
    let n = analysis.factory().value_node_for(v);
    assert_ne!(n, super::INVALID_INDEX, "not a registered pointer: {v:?}");
    match analysis.points_to_set(n) {
        Some(set) => set.iter().collect(),
        None => vec![],
    }
}

fn object_of(analysis: &Andersen<'_>, v: ValueId) -> NodeIndex {
    let n = analysis.factory().object_node_for(v);
    assert_ne!(n, super::INVALID_INDEX, "no object for {v:?}");
    n
}

fn value_op(v: ValueId) -> Operand {
    Operand::Value(v)
}

fn global_op(g: crate::ir::GlobalId) -> Operand {
    Operand::Const(Constant::Global(g))
}

/// Declares an external function (no body).
fn declare(module: &mut Module, name: &str, params: Vec<Type>, ret: Option<Type>) -> FuncId {
    module.add_function(name, params, ret)
}

/// `dest = alloca T` in one call.
fn alloca(module: &mut Module, f: FuncId, b: crate::ir::BlockId, pointee: Type) -> ValueId {
    module.push_inst(f, b, Some(ptr(pointee)), InstKind::Alloca)
}

use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::ir::{Constant, FuncId, ValueId};

use super::{AnalysisError, NodeIndex, INVALID_INDEX};

/// Node #0: the pointer we know nothing about.
pub const UNIVERSAL_PTR: NodeIndex = 0;
/// Node #1: the object we know nothing about (it points to itself).
pub const UNIVERSAL_OBJ: NodeIndex = 1;
/// Node #2: the null pointer.
pub const NULL_PTR: NodeIndex = 2;
/// Node #3: the object the null pointer points to.
pub const NULL_OBJ: NodeIndex = 3;

pub const NUM_RESERVED: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A top-level pointer-valued SSA entity (value, return, callsite).
    Value,
    /// An abstract memory location (global, stack, heap, expanded field).
    Object,
}

struct Node {
    kind: NodeKind,
    value: Option<ValueId>,
    /// Union-find parent; points at itself for representatives. A `Cell`
    /// because path compression happens behind `&self`.
    merge_target: Cell<NodeIndex>,
}

/// The arena that owns every node of the analysis. Nodes are only created
/// through the factory so that indices stay consistent; clients refer to
/// nodes exclusively by `NodeIndex`.
pub struct NodeFactory {
    nodes: Vec<Node>,
    value_map: FxHashMap<ValueId, NodeIndex>,
    obj_map: FxHashMap<ValueId, NodeIndex>,
    ret_map: FxHashMap<FuncId, NodeIndex>,
    vararg_map: FxHashMap<FuncId, NodeIndex>,
}

impl NodeFactory {
    pub fn new() -> NodeFactory {
        let mut factory = NodeFactory {
            nodes: vec![],
            value_map: FxHashMap::default(),
            obj_map: FxHashMap::default(),
            ret_map: FxHashMap::default(),
            vararg_map: FxHashMap::default(),
        };
        factory.push_node(NodeKind::Value, None); // UNIVERSAL_PTR
        factory.push_node(NodeKind::Object, None); // UNIVERSAL_OBJ
        factory.push_node(NodeKind::Value, None); // NULL_PTR
        factory.push_node(NodeKind::Object, None); // NULL_OBJ
        assert_eq!(factory.nodes.len(), NUM_RESERVED);
        factory
    }

    fn push_node(&mut self, kind: NodeKind, value: Option<ValueId>) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            kind,
            value,
            merge_target: Cell::new(idx),
        });
        idx
    }

    pub fn create_value(&mut self, val: Option<ValueId>) -> NodeIndex {
        let idx = self.push_node(NodeKind::Value, val);
        if let Some(val) = val {
            let prev = self.value_map.insert(val, idx);
            assert!(prev.is_none(), "value registered twice: {val:?}");
        }
        idx
    }

    pub fn create_object(&mut self, val: Option<ValueId>) -> NodeIndex {
        let idx = self.push_node(NodeKind::Object, val);
        if let Some(val) = val {
            let prev = self.obj_map.insert(val, idx);
            assert!(prev.is_none(), "object registered twice: {val:?}");
        }
        idx
    }

    pub fn create_return(&mut self, f: FuncId) -> NodeIndex {
        let idx = self.push_node(NodeKind::Value, Some(ValueId::Func(f)));
        let prev = self.ret_map.insert(f, idx);
        assert!(prev.is_none(), "return node registered twice: {f:?}");
        idx
    }

    pub fn create_vararg(&mut self, f: FuncId) -> NodeIndex {
        let idx = self.push_node(NodeKind::Object, Some(ValueId::Func(f)));
        let prev = self.vararg_map.insert(f, idx);
        assert!(prev.is_none(), "vararg node registered twice: {f:?}");
        idx
    }

    /// `INVALID_INDEX` when `val` was never registered; callers must check.
    #[inline]
    pub fn value_node_for(&self, val: ValueId) -> NodeIndex {
        self.value_map.get(&val).copied().unwrap_or(INVALID_INDEX)
    }

    #[inline]
    pub fn object_node_for(&self, val: ValueId) -> NodeIndex {
        self.obj_map.get(&val).copied().unwrap_or(INVALID_INDEX)
    }

    #[inline]
    pub fn return_node_for(&self, f: FuncId) -> NodeIndex {
        self.ret_map.get(&f).copied().unwrap_or(INVALID_INDEX)
    }

    #[inline]
    pub fn vararg_node_for(&self, f: FuncId) -> NodeIndex {
        self.vararg_map.get(&f).copied().unwrap_or(INVALID_INDEX)
    }

    /// Structural resolution of a constant in value position. `Gep`
    /// constants fall back to the base (pointer-to-first-field); the
    /// collector intercepts them first to apply the expanded offset.
    pub fn value_node_for_constant(&self, c: &Constant) -> Result<NodeIndex, AnalysisError> {
        match c {
            Constant::Null | Constant::Undef => Ok(NULL_PTR),
            Constant::Global(g) => Ok(self.value_node_for(ValueId::Global(*g))),
            Constant::Func(f) => Ok(self.value_node_for(ValueId::Func(*f))),
            Constant::Gep { base, .. } => self.value_node_for_constant(base),
            Constant::BitCast(inner) => self.value_node_for_constant(inner),
            Constant::IntToPtr(_) | Constant::PtrToInt(_) => Ok(UNIVERSAL_PTR),
            Constant::Int(_) | Constant::Struct(..) | Constant::Array(_) => {
                Err(AnalysisError::UnhandledConstant(format!("{c:?}")))
            }
        }
    }

    /// Structural resolution of a constant in object position. As with the
    /// value side, `Gep` offsets are applied by the collector.
    pub fn object_node_for_constant(&self, c: &Constant) -> Result<NodeIndex, AnalysisError> {
        match c {
            Constant::Null | Constant::Undef => Ok(NULL_OBJ),
            Constant::Global(g) => Ok(self.object_node_for(ValueId::Global(*g))),
            Constant::Func(f) => Ok(self.object_node_for(ValueId::Func(*f))),
            Constant::Gep { base, .. } => self.object_node_for_constant(base),
            Constant::BitCast(inner) => self.object_node_for_constant(inner),
            Constant::IntToPtr(_) | Constant::PtrToInt(_) => Ok(UNIVERSAL_OBJ),
            Constant::Int(_) | Constant::Struct(..) | Constant::Array(_) => {
                Err(AnalysisError::UnhandledConstant(format!("{c:?}")))
            }
        }
    }

    /// Points `b`'s representative at `a`'s. Merging is monotone: once
    /// merged, nodes are never split again.
    pub fn merge(&mut self, a: NodeIndex, b: NodeIndex) {
        let a_rep = self.rep(a);
        let b_rep = self.rep(b);
        if a_rep != b_rep {
            self.nodes[b_rep].merge_target.set(a_rep);
        }
    }

    /// The union-find root of `n`, with path compression.
    pub fn rep(&self, n: NodeIndex) -> NodeIndex {
        assert!(n < self.nodes.len());
        let mut root = self.nodes[n].merge_target.get();
        while root != self.nodes[root].merge_target.get() {
            root = self.nodes[root].merge_target.get();
        }
        let mut cur = n;
        while cur != root {
            let next = self.nodes[cur].merge_target.get();
            self.nodes[cur].merge_target.set(root);
            cur = next;
        }
        root
    }

    /// Field addressing: field `k` of the object run based at `base`.
    pub fn offset_object(&self, base: NodeIndex, k: usize) -> NodeIndex {
        let idx = base + k;
        assert!(idx < self.nodes.len(), "field offset escapes the arena");
        assert!(
            self.nodes[idx].kind == NodeKind::Object,
            "field offset lands on a non-object node"
        );
        idx
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn kind(&self, n: NodeIndex) -> NodeKind {
        self.nodes[n].kind
    }

    #[inline]
    pub fn is_object_node(&self, n: NodeIndex) -> bool {
        self.nodes[n].kind == NodeKind::Object
    }

    #[inline]
    pub fn value_for_node(&self, n: NodeIndex) -> Option<ValueId> {
        self.nodes[n].value
    }

    /// Every registered memory object and its IR back-reference.
    pub fn allocation_sites(&self) -> impl Iterator<Item = (ValueId, NodeIndex)> + '_ {
        self.obj_map.iter().map(|(v, n)| (*v, *n))
    }
}

impl Default for NodeFactory {
    fn default() -> NodeFactory {
        NodeFactory::new()
    }
}

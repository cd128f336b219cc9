use std::collections::BTreeMap;

use super::bitset::HybridBitSet;
use super::NodeIndex;

/// Adjacency graph whose successor sets are sparse bit vectors, used by the
/// offline passes. The ordered-map backing keeps node insertion during a
/// walk from disturbing iteration of other nodes; the SCC driver
/// additionally snapshots successor sets before descending.
pub struct BitVectorGraph {
    universe: usize,
    graph: BTreeMap<NodeIndex, HybridBitSet>,
}

impl BitVectorGraph {
    pub fn new(universe: usize) -> BitVectorGraph {
        BitVectorGraph {
            universe,
            graph: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn universe(&self) -> usize {
        self.universe
    }

    pub fn insert_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        assert!(src < self.universe && dst < self.universe);
        self.get_or_insert(src).insert(dst)
    }

    /// `src`'s successors += `other`'s successors.
    pub fn merge_edges(&mut self, src: NodeIndex, other: NodeIndex) {
        if src == other {
            return;
        }
        let Some(other_succs) = self.graph.get(&other).cloned() else {
            return;
        };
        self.get_or_insert(src).union(&other_succs);
    }

    pub fn get_or_insert(&mut self, src: NodeIndex) -> &mut HybridBitSet {
        assert!(src < self.universe);
        self.graph
            .entry(src)
            .or_insert_with(|| HybridBitSet::new_empty(self.universe))
    }

    #[inline]
    pub fn get(&self, src: NodeIndex) -> Option<&HybridBitSet> {
        self.graph.get(&src)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.keys().copied()
    }

    pub fn release(&mut self) {
        self.graph.clear();
    }
}

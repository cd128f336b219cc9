use std::fmt;

use super::bitset::{HybridBitSet, HybridIter};
use super::NodeIndex;

/// The points-to set of one node. A thin layer over the hybrid bit set so
/// the internal representation can change without touching the solver.
#[derive(Clone, PartialEq, Eq)]
pub struct PtsSet {
    bitvec: HybridBitSet,
}

impl PtsSet {
    #[inline]
    pub fn new_empty(universe: usize) -> PtsSet {
        PtsSet {
            bitvec: HybridBitSet::new_empty(universe),
        }
    }

    #[inline]
    pub fn has(&self, idx: NodeIndex) -> bool {
        self.bitvec.contains(idx)
    }

    /// Returns true if the set changed.
    #[inline]
    pub fn insert(&mut self, idx: NodeIndex) -> bool {
        self.bitvec.insert(idx)
    }

    /// Returns true if the set changed.
    #[inline]
    pub fn union_with(&mut self, other: &PtsSet) -> bool {
        self.bitvec.union(&other.bitvec)
    }

    /// True if `self` and `other` share any element.
    #[inline]
    pub fn intersects(&self, other: &PtsSet) -> bool {
        self.bitvec.intersects(&other.bitvec)
    }

    /// True if `self` is a superset of `other`.
    #[inline]
    pub fn contains(&self, other: &PtsSet) -> bool {
        self.bitvec.superset(&other.bitvec)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitvec.is_empty()
    }

    /// Not a constant-time operation.
    #[inline]
    pub fn size(&self) -> usize {
        self.bitvec.count()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bitvec.clear()
    }

    #[inline]
    pub fn iter(&self) -> HybridIter<'_> {
        self.bitvec.iter()
    }
}

impl fmt::Debug for PtsSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.bitvec, f)
    }
}

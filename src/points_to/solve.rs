//! The online solver: a fixed-point worklist over the constraint graph,
//! with lazy cycle detection (copy edges that stopped changing anything
//! are candidates for SCC collapse) and the online half of hybrid cycle
//! detection driven by the offline collapse map.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use super::bitset::HybridBitSet;
use super::node::{NodeFactory, UNIVERSAL_OBJ};
use super::pts::PtsSet;
use super::scc::{SccDetector, SccGraph};
use super::{Constraint, ConstraintKind, NodeIndex};

struct EdgeSets {
    copy: HybridBitSet,
    load: HybridBitSet,
    store: HybridBitSet,
}

impl EdgeSets {
    fn new(universe: usize) -> EdgeSets {
        EdgeSets {
            copy: HybridBitSet::new_empty(universe),
            load: HybridBitSet::new_empty(universe),
            store: HybridBitSet::new_empty(universe),
        }
    }
}

/// The constraint graph: per representative, the copy, load and store
/// successor sets. Only edge insertion and lookup are needed; stale
/// endpoints are rewritten lazily as they are discovered.
struct ConstraintGraph {
    universe: usize,
    graph: FxHashMap<NodeIndex, EdgeSets>,
}

impl ConstraintGraph {
    fn new(universe: usize) -> ConstraintGraph {
        ConstraintGraph {
            universe,
            graph: FxHashMap::default(),
        }
    }

    fn entry(&mut self, n: NodeIndex) -> &mut EdgeSets {
        let universe = self.universe;
        self.graph.entry(n).or_insert_with(|| EdgeSets::new(universe))
    }

    fn insert_copy_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.entry(src).copy.insert(dst)
    }

    fn insert_load_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.entry(src).load.insert(dst)
    }

    fn insert_store_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.entry(src).store.insert(dst)
    }

    #[inline]
    fn get(&self, n: NodeIndex) -> Option<&EdgeSets> {
        self.graph.get(&n)
    }

    /// `to` absorbs `from`'s edges; `from`'s entry is removed.
    fn merge(&mut self, to: NodeIndex, from: NodeIndex) {
        if to == from {
            return;
        }
        let Some(from_edges) = self.graph.remove(&from) else {
            return;
        };
        let to_edges = self.entry(to);
        to_edges.copy.union(&from_edges.copy);
        to_edges.load.union(&from_edges.load);
        to_edges.store.union(&from_edges.store);
    }
}

/// FIFO worklist with deduplicating enqueue.
struct Worklist {
    list: VecDeque<NodeIndex>,
    set: FxHashSet<NodeIndex>,
}

impl Worklist {
    fn new() -> Worklist {
        Worklist {
            list: VecDeque::new(),
            set: FxHashSet::default(),
        }
    }

    fn enqueue(&mut self, n: NodeIndex) {
        if self.set.insert(n) {
            self.list.push_back(n);
        }
    }

    fn dequeue(&mut self) -> Option<NodeIndex> {
        let n = self.list.pop_front()?;
        self.set.remove(&n);
        Some(n)
    }

    fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

pub fn solve(
    factory: &mut NodeFactory,
    constraints: Vec<Constraint>,
    pts: &mut FxHashMap<NodeIndex, PtsSet>,
    collapse: FxHashMap<NodeIndex, NodeIndex>,
    enable_lcd: bool,
) {
    let universe = factory.num_nodes();
    let mut graph = ConstraintGraph::new(universe);
    for c in &constraints {
        let d = factory.rep(c.dest);
        let s = factory.rep(c.src);
        match c.kind {
            ConstraintKind::AddrOf => {
                // The source keeps its original index: the address of a
                // variable is not the address of its representative.
                pts.entry(d)
                    .or_insert_with(|| PtsSet::new_empty(universe))
                    .insert(c.src);
            }
            ConstraintKind::Load => {
                graph.insert_load_edge(s, d);
            }
            ConstraintKind::Store => {
                graph.insert_store_edge(d, s);
            }
            ConstraintKind::Copy => {
                graph.insert_copy_edge(s, d);
            }
        }
    }
    drop(constraints);
    for set in pts.values_mut() {
        normalize_universal(set);
    }

    let mut solver = Solver {
        factory,
        pts,
        graph,
        collapse,
        next: Worklist::new(),
        candidates: FxHashSet::default(),
        checked_edges: FxHashSet::default(),
        enable_lcd,
        universe,
    };
    solver.run();
}

/// The universal object is contagious: a set that gains it collapses to
/// the singleton.
fn normalize_universal(set: &mut PtsSet) {
    if set.has(UNIVERSAL_OBJ) && set.size() > 1 {
        set.clear();
        set.insert(UNIVERSAL_OBJ);
    }
}

struct Solver<'a> {
    factory: &'a mut NodeFactory,
    pts: &'a mut FxHashMap<NodeIndex, PtsSet>,
    graph: ConstraintGraph,
    collapse: FxHashMap<NodeIndex, NodeIndex>,
    next: Worklist,
    /// Nodes LCD believes might be on a cycle.
    candidates: FxHashSet<NodeIndex>,
    /// Copy edges already checked for cycles.
    checked_edges: FxHashSet<(NodeIndex, NodeIndex)>,
    enable_lcd: bool,
    universe: usize,
}

impl Solver<'_> {
    fn run(&mut self) {
        let mut curr = Worklist::new();
        for i in 0..self.universe {
            if self.factory.rep(i) == i
                && self.pts.contains_key(&i)
                && self.graph.get(i).is_some()
            {
                curr.enqueue(i);
            }
        }

        while !curr.is_empty() {
            if self.enable_lcd && !self.candidates.is_empty() {
                self.detect_online_cycles();
            }
            while let Some(n) = curr.dequeue() {
                self.process(n);
            }
            std::mem::swap(&mut curr, &mut self.next);
        }
    }

    #[inline]
    fn enqueue(&mut self, n: NodeIndex) {
        self.next.enqueue(n);
    }

    fn process(&mut self, n: NodeIndex) {
        let n = self.factory.rep(n);

        // HCD fast path: everything this pointer points to belongs to one
        // cycle and collapses into the offline-computed representative.
        if let Some(&target) = self.collapse.get(&n) {
            let target = self.factory.rep(target);
            let elems: Vec<NodeIndex> = match self.pts.get(&n) {
                Some(set) => set.iter().collect(),
                None => vec![],
            };
            let mut merged_self = false;
            for v in elems {
                let vr = self.factory.rep(v);
                if vr == target {
                    continue;
                }
                if vr == n {
                    merged_self = true;
                }
                self.merge_nodes(target, vr);
            }
            if merged_self {
                // This node is no longer its own representative; start
                // over from the merged node.
                let rep = self.factory.rep(n);
                self.enqueue(rep);
                return;
            }
        }

        let elems: Vec<NodeIndex> = match self.pts.get(&n) {
            Some(set) => set.iter().collect(),
            None => return,
        };
        let Some(edges) = self.graph.get(n) else {
            return;
        };
        let load_targets: Vec<NodeIndex> = edges.load.iter().collect();
        let store_targets: Vec<NodeIndex> = edges.store.iter().collect();
        let copy_targets: Vec<NodeIndex> = edges.copy.iter().collect();

        let mut stale = false;
        for &o in &elems {
            let or = self.factory.rep(o);
            for &t in &load_targets {
                let tr = self.factory.rep(t);
                stale |= tr != t;
                if self.graph.insert_copy_edge(or, tr) {
                    self.enqueue(or);
                }
            }
            for &t in &store_targets {
                let tr = self.factory.rep(t);
                stale |= tr != t;
                if self.graph.insert_copy_edge(tr, or) {
                    self.enqueue(tr);
                }
            }
        }

        if let Some(src_set) = self.pts.get(&n).cloned() {
            for &t in &copy_targets {
                let tr = self.factory.rep(t);
                stale |= tr != t;
                if tr == n {
                    continue;
                }
                let universe = self.universe;
                let tgt_set = self
                    .pts
                    .entry(tr)
                    .or_insert_with(|| PtsSet::new_empty(universe));
                if tgt_set.union_with(&src_set) {
                    normalize_universal(tgt_set);
                    self.enqueue(tr);
                } else if self.enable_lcd
                    && !self.checked_edges.contains(&(n, tr))
                    && src_set == *tgt_set
                {
                    // Equal points-to sets across an unchecked copy edge:
                    // a cycle candidate for the next iteration.
                    self.checked_edges.insert((n, tr));
                    self.candidates.insert(tr);
                }
            }
        }

        if stale {
            self.rewrite_stale_edges(n);
        }
    }

    /// Re-resolves the stored successor sets of `n` to current
    /// representatives.
    fn rewrite_stale_edges(&mut self, n: NodeIndex) {
        let Some(old) = self.graph.graph.remove(&n) else {
            return;
        };
        let mut new = EdgeSets::new(self.universe);
        for t in old.copy.iter() {
            new.copy.insert(self.factory.rep(t));
        }
        for t in old.load.iter() {
            new.load.insert(self.factory.rep(t));
        }
        for t in old.store.iter() {
            new.store.insert(self.factory.rep(t));
        }
        self.graph.graph.insert(n, new);
    }

    /// Makes `a` the representative of `b`, absorbing its points-to set
    /// and its constraint-graph entry.
    fn merge_nodes(&mut self, a: NodeIndex, b: NodeIndex) {
        let a = self.factory.rep(a);
        let b = self.factory.rep(b);
        if a == b {
            return;
        }
        self.factory.merge(a, b);
        if let Some(b_set) = self.pts.remove(&b) {
            let universe = self.universe;
            let a_set = self
                .pts
                .entry(a)
                .or_insert_with(|| PtsSet::new_empty(universe));
            a_set.union_with(&b_set);
            normalize_universal(a_set);
        }
        self.graph.merge(a, b);
        self.enqueue(a);
    }

    fn detect_online_cycles(&mut self) {
        let mut seeds: Vec<NodeIndex> = self.candidates.drain().collect();
        seeds.sort_unstable();
        let mut detector = SccDetector::new(self.universe);
        detector.run(self, &seeds);
    }
}

impl SccGraph for Solver<'_> {
    fn rep(&mut self, n: NodeIndex) -> NodeIndex {
        self.factory.rep(n)
    }

    fn successors(&self, n: NodeIndex, out: &mut Vec<NodeIndex>) {
        if let Some(edges) = self.graph.get(n) {
            out.extend(edges.copy.iter());
        }
    }

    fn on_cycle_member(&mut self, member: NodeIndex, rep: NodeIndex) {
        self.merge_nodes(rep, member);
    }

    fn on_cycle_rep(&mut self, rep: NodeIndex) {
        self.enqueue(rep);
    }
}

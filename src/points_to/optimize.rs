//! Offline variable substitution: HVN (value numbering of the predecessor
//! graph without set unions) and HU (the same structure with set unions),
//! per Hardekopf & Lin, "Exploiting Pointer and Location Equivalence to
//! Optimize Pointer Analysis" (SAS 2007). Nodes proven pointer-equivalent
//! are merged before solving; loads and stores through pointers with a
//! statically known target are lowered to copies.

use rustc_hash::{FxHashMap, FxHashSet};

use super::bitset::HybridBitSet;
use super::graph::BitVectorGraph;
use super::node::{NodeFactory, NodeKind, NUM_RESERVED};
use super::scc::{SccDetector, SccGraph};
use super::{Constraint, ConstraintKind, NodeIndex};

pub fn optimize_constraints(
    factory: &mut NodeFactory,
    constraints: &mut Vec<Constraint>,
    enable_hu: bool,
) {
    run_pass(PassKind::Hvn, factory, constraints);
    if enable_hu {
        run_pass(PassKind::Hu, factory, constraints);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Hvn,
    Hu,
}

fn run_pass(kind: PassKind, factory: &mut NodeFactory, constraints: &mut Vec<Constraint>) {
    let num_nodes = factory.num_nodes();
    let mut pass = OfflinePass::build(kind, factory, constraints);
    let mut detector = SccDetector::new(3 * num_nodes);
    let seeds: Vec<NodeIndex> = (0..num_nodes).collect();
    detector.run(&mut pass, &seeds);
    if kind == PassKind::Hu {
        pass.assign_set_labels();
    }
    pass.rewrite(factory, constraints);
}

/// One labelling pass over the predecessor graph. The graph lives in a
/// 3·N virtual index space: VAR `[0, N)`, REF `[N, 2N)`, ADR `[2N, 3N)`.
/// REF and ADR indices are synthetic and never reach the node factory.
struct OfflinePass {
    kind: PassKind,
    num_nodes: usize,
    graph: BitVectorGraph,
    /// VAR nodes whose address is taken, plus SCC representatives that
    /// absorbed a REF/ADR or indirect member.
    indirect: FxHashSet<NodeIndex>,
    /// Local condensation union-find over the virtual index space.
    rep: Vec<NodeIndex>,
    labels: Vec<u32>,
    next_label: u32,
    label_table: FxHashMap<Vec<u32>, u32>,
    sets: Vec<Option<HybridBitSet>>,
}

impl OfflinePass {
    fn build(kind: PassKind, factory: &NodeFactory, constraints: &[Constraint]) -> OfflinePass {
        let n = factory.num_nodes();
        let mut graph = BitVectorGraph::new(3 * n);
        let mut indirect = FxHashSet::default();
        for c in constraints {
            let d = factory.rep(c.dest);
            let s = factory.rep(c.src);
            match c.kind {
                ConstraintKind::AddrOf => {
                    indirect.insert(s);
                    graph.insert_edge(d, s + 2 * n);
                    graph.insert_edge(d + n, s);
                }
                ConstraintKind::Copy => {
                    graph.insert_edge(d, s);
                    graph.insert_edge(d + n, s + n);
                }
                ConstraintKind::Load => {
                    graph.insert_edge(d, s + n);
                }
                ConstraintKind::Store => {
                    graph.insert_edge(d + n, s);
                }
            }
        }
        OfflinePass {
            kind,
            num_nodes: n,
            graph,
            indirect,
            rep: (0..3 * n).collect(),
            labels: vec![0; 3 * n],
            next_label: 1,
            label_table: FxHashMap::default(),
            sets: vec![None; 3 * n],
        }
    }

    fn chase(&mut self, n: NodeIndex) -> NodeIndex {
        let mut root = n;
        while self.rep[root] != root {
            root = self.rep[root];
        }
        let mut cur = n;
        while cur != root {
            let next = self.rep[cur];
            self.rep[cur] = root;
            cur = next;
        }
        root
    }

    fn fresh_label(&mut self) -> u32 {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    /// Pointer-equivalence label of a node, fixed up through both the
    /// factory union-find and the local condensation.
    fn var_label(&mut self, factory: &NodeFactory, v: NodeIndex) -> u32 {
        let r = factory.rep(v);
        let r = self.chase(r);
        self.labels[r]
    }

    fn pred_reps(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let preds: Vec<NodeIndex> = self
            .graph
            .get(node)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(preds.len());
        for p in preds {
            let pr = self.chase(p);
            if pr != node {
                out.push(pr);
            }
        }
        out
    }

    fn hvn_label(&mut self, node: NodeIndex) {
        if node >= self.num_nodes || self.indirect.contains(&node) {
            let l = self.fresh_label();
            self.labels[node] = l;
            return;
        }
        let mut pred_labels: Vec<u32> = vec![];
        for pr in self.pred_reps(node) {
            let l = self.labels[pr];
            if l != 0 && !pred_labels.contains(&l) {
                pred_labels.push(l);
            }
        }
        pred_labels.sort_unstable();
        let label = match pred_labels.len() {
            0 => 0,
            1 => pred_labels[0],
            _ => match self.label_table.get(&pred_labels) {
                Some(&l) => l,
                None => {
                    let l = self.fresh_label();
                    self.label_table.insert(pred_labels, l);
                    l
                }
            },
        };
        self.labels[node] = label;
    }

    fn hu_set(&mut self, node: NodeIndex) {
        let n = self.num_nodes;
        let mut set = HybridBitSet::new_empty(3 * n);
        if node >= 2 * n {
            // ADR(v) holds exactly v.
            set.insert(node - 2 * n);
        } else if node >= n {
            // REF(v) stands for the unknown *v.
            set.insert(node);
        } else if self.indirect.contains(&node) {
            set.insert(node + 2 * n);
        } else {
            for pr in self.pred_reps(node) {
                if let Some(pred_set) = &self.sets[pr] {
                    set.union(pred_set);
                }
            }
        }
        self.sets[node] = Some(set);
    }

    /// HU only: convert the computed sets into labels, sharing a label
    /// between nodes with identical sets.
    fn assign_set_labels(&mut self) {
        let mut table: FxHashMap<HybridBitSet, u32> = FxHashMap::default();
        for node in 0..3 * self.num_nodes {
            if self.rep[node] != node {
                continue;
            }
            let Some(set) = &self.sets[node] else { continue };
            if set.is_empty() {
                continue;
            }
            let label = match table.get(set) {
                Some(&l) => l,
                None => {
                    let l = self.next_label;
                    self.next_label += 1;
                    table.insert(set.clone(), l);
                    l
                }
            };
            self.labels[node] = label;
        }
    }

    /// Merges same-label value nodes and rewrites the constraint vector:
    /// loads and stores whose pointer label matches some ADR become plain
    /// copies, copies from an address-labelled source become `AddrOf`,
    /// self-copies and copies from non-pointers are dropped, and the
    /// result is deduplicated.
    fn rewrite(mut self, factory: &mut NodeFactory, constraints: &mut Vec<Constraint>) {
        let n = self.num_nodes;

        // Every ADR label is unique to its VAR, so this map is injective.
        let mut adr_owner: FxHashMap<u32, NodeIndex> = FxHashMap::default();
        for v in 0..n {
            let adr = self.chase(v + 2 * n);
            let l = self.labels[adr];
            if l != 0 {
                adr_owner.entry(l).or_insert(v);
            }
        }

        let mut owner: FxHashMap<u32, NodeIndex> = FxHashMap::default();
        for v in 0..n {
            if v < NUM_RESERVED || factory.kind(v) != NodeKind::Value {
                continue;
            }
            let l = self.var_label(factory, v);
            if l == 0 {
                continue;
            }
            match owner.get(&l) {
                Some(&first) => factory.merge(first, v),
                None => {
                    owner.insert(l, factory.rep(v));
                }
            }
        }

        let mut seen = FxHashSet::default();
        let old = std::mem::take(constraints);
        for c in old {
            let rd = factory.rep(c.dest);
            let rs = factory.rep(c.src);
            let rewritten = match c.kind {
                ConstraintKind::AddrOf => {
                    // The source keeps its identity: the address of a
                    // variable is not the address of its representative.
                    Some(Constraint::new(ConstraintKind::AddrOf, rd, c.src))
                }
                ConstraintKind::Copy => {
                    if rd == rs {
                        None
                    } else {
                        let ls = self.var_label(factory, c.src);
                        if ls == 0 {
                            None
                        } else if let Some(&v) = adr_owner.get(&ls) {
                            Some(Constraint::new(ConstraintKind::AddrOf, rd, v))
                        } else {
                            Some(Constraint::new(ConstraintKind::Copy, rd, rs))
                        }
                    }
                }
                ConstraintKind::Load => {
                    let ls = self.var_label(factory, c.src);
                    match adr_owner.get(&ls) {
                        Some(&v) => {
                            let rv = factory.rep(v);
                            if rv == rd {
                                None
                            } else {
                                Some(Constraint::new(ConstraintKind::Copy, rd, rv))
                            }
                        }
                        None => Some(Constraint::new(ConstraintKind::Load, rd, rs)),
                    }
                }
                ConstraintKind::Store => {
                    let ld = self.var_label(factory, c.dest);
                    match adr_owner.get(&ld) {
                        Some(&v) => {
                            let rv = factory.rep(v);
                            if rv == rs {
                                None
                            } else {
                                Some(Constraint::new(ConstraintKind::Copy, rv, rs))
                            }
                        }
                        None => Some(Constraint::new(ConstraintKind::Store, rd, rs)),
                    }
                }
            };
            if let Some(nc) = rewritten {
                if seen.insert(nc) {
                    constraints.push(nc);
                }
            }
        }
        self.graph.release();
    }
}

impl SccGraph for OfflinePass {
    fn rep(&mut self, n: NodeIndex) -> NodeIndex {
        self.chase(n)
    }

    fn successors(&self, n: NodeIndex, out: &mut Vec<NodeIndex>) {
        if let Some(succs) = self.graph.get(n) {
            out.extend(succs.iter());
        }
    }

    fn on_cycle_member(&mut self, member: NodeIndex, rep: NodeIndex) {
        self.rep[member] = rep;
        self.graph.merge_edges(rep, member);
        if member >= self.num_nodes || self.indirect.contains(&member) {
            self.indirect.insert(rep);
        }
    }

    fn on_cycle_rep(&mut self, rep: NodeIndex) {
        match self.kind {
            PassKind::Hvn => self.hvn_label(rep),
            PassKind::Hu => self.hu_set(rep),
        }
    }
}

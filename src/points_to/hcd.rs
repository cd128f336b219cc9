//! Offline half of hybrid cycle detection (Hardekopf & Lin, PLDI 2007).
//! A load or store cycle detected on the offline constraint graph means
//! that everything its pointer ever points to can be collapsed with the
//! cycle's representative as soon as it shows up during solving.

use etrace::some_or;
use rustc_hash::FxHashMap;

use super::graph::BitVectorGraph;
use super::node::NodeFactory;
use super::scc::{SccDetector, SccGraph};
use super::{Constraint, ConstraintKind, NodeIndex};

/// Runs the offline pass and returns the collapse map: `v -> rep` means
/// any object in `pts(v)` may be merged into `rep` during solving. VAR
/// members of a cycle are merged here, immediately.
pub fn offline_hcd(
    factory: &mut NodeFactory,
    constraints: &[Constraint],
) -> FxHashMap<NodeIndex, NodeIndex> {
    let num_nodes = factory.num_nodes();
    // VAR indices in [0, N), REF indices in [N, 2N).
    let mut graph = BitVectorGraph::new(2 * num_nodes);
    for c in constraints {
        let d = factory.rep(c.dest);
        let s = factory.rep(c.src);
        match c.kind {
            ConstraintKind::AddrOf => {}
            ConstraintKind::Load => {
                graph.insert_edge(s + num_nodes, d);
            }
            ConstraintKind::Store => {
                graph.insert_edge(s, d + num_nodes);
            }
            ConstraintKind::Copy => {
                graph.insert_edge(s, d);
            }
        }
    }

    let mut pass = Hcd {
        num_nodes,
        graph,
        factory,
        members: vec![],
        collapse: FxHashMap::default(),
    };
    let mut detector = SccDetector::new(2 * num_nodes);
    let seeds: Vec<NodeIndex> = (0..2 * num_nodes).collect();
    detector.run(&mut pass, &seeds);
    pass.collapse
}

struct Hcd<'a> {
    num_nodes: usize,
    graph: BitVectorGraph,
    factory: &'a mut NodeFactory,
    /// Members of the SCC currently being closed.
    members: Vec<NodeIndex>,
    collapse: FxHashMap<NodeIndex, NodeIndex>,
}

impl SccGraph for Hcd<'_> {
    fn rep(&mut self, n: NodeIndex) -> NodeIndex {
        // REF indices are synthetic: they are their own representative.
        if n >= self.num_nodes {
            n
        } else {
            self.factory.rep(n)
        }
    }

    fn successors(&self, n: NodeIndex, out: &mut Vec<NodeIndex>) {
        if let Some(succs) = self.graph.get(n) {
            out.extend(succs.iter());
        }
    }

    fn on_cycle_member(&mut self, member: NodeIndex, _rep: NodeIndex) {
        self.members.push(member);
    }

    fn on_cycle_rep(&mut self, rep: NodeIndex) {
        // A trivial cycle is not interesting.
        if self.members.is_empty() {
            return;
        }
        self.members.push(rep);
        let rep_var = self
            .members
            .iter()
            .copied()
            .filter(|&m| m < self.num_nodes)
            .min();
        // Load and store edges alternate between VAR and REF indices, so
        // any cycle contains at least one VAR.
        let rep_var = some_or!(rep_var, {
            self.members.clear();
            return;
        });
        for i in 0..self.members.len() {
            let m = self.members[i];
            if m >= self.num_nodes {
                self.collapse.insert(m - self.num_nodes, rep_var);
            } else if m != rep_var {
                self.factory.merge(rep_var, m);
            }
        }
        self.members.clear();
    }
}

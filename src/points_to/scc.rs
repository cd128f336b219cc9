use super::NodeIndex;

/// The graph interface the SCC engine runs over. Implementors supply
/// successor snapshots and representative resolution, and receive the
/// members of every non-trivial component: `on_cycle_member` once per
/// non-representative member, then `on_cycle_rep` for the component root.
pub trait SccGraph {
    /// Current representative of a node. Consulted before every visit so
    /// that merges performed by the callbacks are respected.
    fn rep(&mut self, n: NodeIndex) -> NodeIndex;
    /// Appends the successors of `n` to `out`.
    fn successors(&self, n: NodeIndex, out: &mut Vec<NodeIndex>);
    fn on_cycle_member(&mut self, member: NodeIndex, rep: NodeIndex);
    fn on_cycle_rep(&mut self, rep: NodeIndex);
}

struct Frame {
    node: NodeIndex,
    stamp: i32,
    succs: Vec<NodeIndex>,
    next: usize,
}

/// Nuutila's improvement of Tarjan's algorithm: one stack, an in-component
/// set and DFS numbers. Driven by an explicit frame stack so deep chains in
/// real modules cannot overflow the native stack.
pub struct SccDetector {
    dfs_num: Vec<i32>,
    in_component: Vec<bool>,
    scc_stack: Vec<NodeIndex>,
    timestamp: i32,
}

impl SccDetector {
    pub fn new(universe: usize) -> SccDetector {
        SccDetector {
            dfs_num: vec![-1; universe],
            in_component: vec![false; universe],
            scc_stack: vec![],
            timestamp: 0,
        }
    }

    pub fn run<G: SccGraph>(&mut self, graph: &mut G, seeds: &[NodeIndex]) {
        for &seed in seeds {
            let rep = graph.rep(seed);
            if self.dfs_num[rep] < 0 {
                self.visit(graph, rep);
            }
        }
        assert!(self.scc_stack.is_empty());
    }

    fn push_frame<G: SccGraph>(&mut self, graph: &G, frames: &mut Vec<Frame>, node: NodeIndex) {
        let stamp = self.timestamp;
        self.timestamp += 1;
        self.dfs_num[node] = stamp;
        let mut succs = vec![];
        graph.successors(node, &mut succs);
        frames.push(Frame {
            node,
            stamp,
            succs,
            next: 0,
        });
    }

    fn visit<G: SccGraph>(&mut self, graph: &mut G, start: NodeIndex) {
        let mut frames: Vec<Frame> = vec![];
        self.push_frame(graph, &mut frames, start);

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            let stamp = frame.stamp;

            if frame.next < frame.succs.len() {
                let succ = frame.succs[frame.next];
                frame.next += 1;
                let succ_rep = graph.rep(succ);
                assert!(succ_rep < self.dfs_num.len());
                if self.dfs_num[succ_rep] < 0 {
                    self.push_frame(graph, &mut frames, succ_rep);
                } else if !self.in_component[succ_rep] && self.dfs_num[node] > self.dfs_num[succ_rep]
                {
                    self.dfs_num[node] = self.dfs_num[succ_rep];
                }
                continue;
            }

            frames.pop();
            if stamp != self.dfs_num[node] {
                // Not a component root yet.
                self.scc_stack.push(node);
            } else {
                self.in_component[node] = true;
                while let Some(&top) = self.scc_stack.last() {
                    if self.dfs_num[top] < stamp {
                        break;
                    }
                    self.scc_stack.pop();
                    graph.on_cycle_member(top, node);
                    self.in_component[top] = true;
                }
                graph.on_cycle_rep(node);
            }

            if let Some(parent) = frames.last() {
                let parent_node = parent.node;
                if !self.in_component[node] && self.dfs_num[parent_node] > self.dfs_num[node] {
                    self.dfs_num[parent_node] = self.dfs_num[node];
                }
            }
        }
    }
}

//! Field-sensitive, inclusion-based (Andersen-style) pointer analysis.
//!
//! The pipeline: constraint collection over the module, offline variable
//! substitution (HVN/HU), offline hybrid cycle detection, then a worklist
//! solver with lazy cycle detection. The result maps every pointer-valued
//! IR entity to an over-approximation of the abstract memory objects it
//! may refer to, and backs the alias and points-to queries.

pub mod bitset;
pub mod collect;
pub mod extlib;
pub mod graph;
pub mod hcd;
pub mod node;
pub mod optimize;
pub mod pts;
pub mod scc;
pub mod solve;
pub mod structs;

#[cfg(test)]
mod test;

use std::fmt;
use std::fmt::Write;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ir::{Module, ValueId};

use self::node::{NodeFactory, NodeKind, NULL_OBJ};
use self::pts::PtsSet;
use self::structs::StructOracle;

pub type NodeIndex = usize;

/// Sentinel for "this IR value has no node"; callers must check.
pub const INVALID_INDEX: NodeIndex = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    AddrOf,
    Copy,
    Load,
    Store,
}

/// One inclusion constraint. Offsets do not appear here: field
/// sensitivity is materialised at node-index level, so field `k` of an
/// object run based at `o` is simply node `o + k`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub dest: NodeIndex,
    pub src: NodeIndex,
}

impl Constraint {
    #[inline]
    pub fn new(kind: ConstraintKind, dest: NodeIndex, src: NodeIndex) -> Constraint {
        Constraint { kind, dest, src }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConstraintKind::AddrOf => write!(f, "{} <- &{}", self.dest, self.src),
            ConstraintKind::Copy => write!(f, "{} <- {}", self.dest, self.src),
            ConstraintKind::Load => write!(f, "{} <- *{}", self.dest, self.src),
            ConstraintKind::Store => write!(f, "*{} <- {}", self.dest, self.src),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("unhandled constant expression: {0}")]
    UnhandledConstant(String),
    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),
    #[error("unknown library function: {0}")]
    UnknownLibraryFunction(String),
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    pub enable_hcd: bool,
    pub enable_lcd: bool,
    pub enable_hu: bool,
    pub dump_debug: bool,
    pub dump_result: bool,
    pub dump_constraints: bool,
}

impl Default for AnalysisConfig {
    fn default() -> AnalysisConfig {
        AnalysisConfig {
            enable_hcd: true,
            enable_lcd: true,
            enable_hu: true,
            dump_debug: false,
            dump_result: false,
            dump_constraints: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    No,
    May,
    Must,
}

/// A finished analysis: the node arena plus the solved points-to graph,
/// borrowing the module for queries.
pub struct Andersen<'m> {
    module: &'m Module,
    factory: NodeFactory,
    pts: FxHashMap<NodeIndex, PtsSet>,
}

impl<'m> Andersen<'m> {
    pub fn run(module: &'m Module, config: AnalysisConfig) -> Result<Andersen<'m>, AnalysisError> {
        let oracle = StructOracle::build(module);
        let mut factory = NodeFactory::new();
        let mut constraints = collect::collect(module, &oracle, &mut factory)?;
        tracing::debug!(
            nodes = factory.num_nodes(),
            constraints = constraints.len(),
            "constraints collected"
        );
        if config.dump_constraints {
            tracing::info!("collected constraints:\n{}", dump_constraints_text(&constraints));
        }

        optimize::optimize_constraints(&mut factory, &mut constraints, config.enable_hu);
        if config.dump_constraints {
            tracing::info!("optimized constraints:\n{}", dump_constraints_text(&constraints));
        }

        let collapse = if config.enable_hcd {
            hcd::offline_hcd(&mut factory, &constraints)
        } else {
            FxHashMap::default()
        };

        let mut pts = FxHashMap::default();
        solve::solve(&mut factory, constraints, &mut pts, collapse, config.enable_lcd);

        let result = Andersen {
            module,
            factory,
            pts,
        };
        if config.dump_debug {
            tracing::info!("nodes:\n{}", result.dump_nodes_text());
            tracing::info!("node merges:\n{}", result.dump_reps_text());
        }
        if config.dump_result {
            tracing::info!("points-to sets:\n{}", result.dump_result_text());
        }
        Ok(result)
    }

    #[inline]
    pub fn factory(&self) -> &NodeFactory {
        &self.factory
    }

    /// The solved points-to set of a node, through its representative.
    pub fn points_to_set(&self, n: NodeIndex) -> Option<&PtsSet> {
        self.pts.get(&self.factory.rep(n))
    }

    /// The IR values `v` may point to. `None` if `v` is not a known
    /// pointer; objects without a back-reference and the null object are
    /// skipped.
    pub fn points_to(&self, v: ValueId) -> Option<Vec<ValueId>> {
        let n = self.factory.value_node_for(v);
        if n == INVALID_INDEX {
            return None;
        }
        let mut out = vec![];
        if let Some(set) = self.points_to_set(n) {
            for idx in set.iter() {
                if idx == NULL_OBJ {
                    continue;
                }
                if let Some(val) = self.factory.value_for_node(idx) {
                    out.push(val);
                }
            }
        }
        Some(out)
    }

    /// Every registered object node's IR back-reference.
    pub fn all_allocation_sites(&self) -> Vec<ValueId> {
        self.factory.allocation_sites().map(|(v, _)| v).collect()
    }

    pub fn alias(&self, v1: ValueId, v2: ValueId) -> AliasKind {
        let n1 = self.factory.value_node_for(v1);
        let n2 = self.factory.value_node_for(v2);
        if n1 == INVALID_INDEX || n2 == INVALID_INDEX {
            // We know nothing about at least one of them.
            return AliasKind::May;
        }
        let r1 = self.factory.rep(n1);
        let r2 = self.factory.rep(n2);
        if r1 == r2 {
            return AliasKind::Must;
        }
        let (Some(s1), Some(s2)) = (self.pts.get(&r1), self.pts.get(&r2)) else {
            return AliasKind::May;
        };
        let null_only = |s: &PtsSet| s.size() == 1 && s.has(NULL_OBJ);
        if null_only(s1) || null_only(s2) {
            return AliasKind::No;
        }
        if s1.size() == 1 && s2.size() == 1 && s1.iter().next() == s2.iter().next() {
            return AliasKind::Must;
        }
        for idx in s1.iter() {
            if idx == NULL_OBJ {
                continue;
            }
            if s2.has(idx) {
                return AliasKind::May;
            }
        }
        AliasKind::No
    }

    /// True iff everything `v` can point to is the null object, a
    /// function, or a constant global.
    pub fn points_to_constant_memory(&self, v: ValueId) -> bool {
        let n = self.factory.value_node_for(v);
        if n == INVALID_INDEX {
            return false;
        }
        let Some(set) = self.points_to_set(n) else {
            return false;
        };
        for idx in set.iter() {
            match self.factory.value_for_node(idx) {
                Some(ValueId::Global(g)) => {
                    if !self.module.global(g).is_const {
                        return false;
                    }
                }
                Some(ValueId::Func(_)) => {}
                Some(_) => return false,
                None => {
                    if idx != NULL_OBJ {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn dump_nodes_text(&self) -> String {
        let mut out = String::new();
        for i in 0..self.factory.num_nodes() {
            let kind = match self.factory.kind(i) {
                NodeKind::Value => 'V',
                NodeKind::Object => 'O',
            };
            match self.factory.value_for_node(i) {
                Some(v) => {
                    let _ = writeln!(out, "[{kind} #{i}] {v:?}");
                }
                None => {
                    let _ = writeln!(out, "[{kind} #{i}]");
                }
            }
        }
        out
    }

    fn dump_reps_text(&self) -> String {
        let mut out = String::new();
        for i in 0..self.factory.num_nodes() {
            let rep = self.factory.rep(i);
            if rep != i {
                let _ = writeln!(out, "{i} -> {rep}");
            }
        }
        out
    }

    fn dump_result_text(&self) -> String {
        let mut keys: Vec<_> = self.pts.keys().copied().collect();
        keys.sort_unstable();
        let mut out = String::new();
        for n in keys {
            let set = &self.pts[&n];
            let elems: Vec<_> = set.iter().collect();
            match self.factory.value_for_node(n) {
                Some(v) => {
                    let _ = writeln!(out, "{n} ({v:?}): {elems:?}");
                }
                None => {
                    let _ = writeln!(out, "{n}: {elems:?}");
                }
            }
        }
        out
    }
}

fn dump_constraints_text(constraints: &[Constraint]) -> String {
    let mut out = String::new();
    for c in constraints {
        let _ = writeln!(out, "{c:?}");
    }
    out
}

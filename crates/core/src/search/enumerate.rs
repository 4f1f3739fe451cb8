//! Bounded depth-first enumeration of candidate anomaly cycles.

use std::time::Instant;

use hashbrown::{HashMap, HashSet};

use crate::config::CheckConfig;
use crate::error::{BudgetKind, Error};
use crate::graph::{ConflictGraph, EdgeKind};
use crate::model::{Expr, UnitLabel};
use crate::search::validate::{validate_cycle, CycleVerdict};
use crate::solver::SatBackend;

/// One accepted cycle: the path in discovery order plus its satisfying
/// assertion set.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecord {
    pub path: Vec<UnitLabel>,
    pub assertions: Vec<Expr>,
}

/// Everything the cycle search produced, keyed by rotation-normalized
/// cycle identity.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone)]
pub struct CycleFindings {
    pub accepted: HashMap<Vec<UnitLabel>, CycleRecord>,
    /// Candidates whose shape rules passed but whose assertions the
    /// solver could not decide. Kept apart from accepted cycles; a
    /// careful caller treats them as possible anomalies.
    pub undecided: HashSet<Vec<UnitLabel>>,
}

impl CycleFindings {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.undecided.is_empty()
    }
}

/// Enumerate and validate anomaly cycles of `graph`.
///
/// From every valid starting unit an explicit-stack DFS explores paths,
/// never revisiting a path unit (an immediate self-loop excepted) or
/// reusing a labelled edge, and pruning any path whose distinct cloned
/// sequence families exceed the clone budget. A path whose head lands in
/// the start's own business sequence (but is not the start itself) is a
/// candidate; accepted and undecided candidates stop extending, rejected
/// ones keep exploring.
///
/// # Errors
///
/// [`Error::SearchBudgetExceeded`] when a path outgrows
/// `max_path_len` or the wall clock outruns `max_time`.
pub fn find_cycles<B: SatBackend>(
    graph: &ConflictGraph,
    backend: &B,
    config: &CheckConfig,
) -> Result<CycleFindings, Error> {
    let starts = starting_units(graph);
    let started = Instant::now();
    let mut findings = CycleFindings::default();

    for &start in &starts {
        let start_seq = graph
            .sequence_of(start)
            .ok_or(Error::BrokenInvariant("unit missing from sequence registry"))?;

        let mut stack: Vec<SearchState> = vec![SearchState {
            node: start,
            path: vec![start],
            edges: Vec::new(),
        }];

        while let Some(state) = stack.pop() {
            if started.elapsed() > config.ceiling.max_time {
                return Err(Error::SearchBudgetExceeded(BudgetKind::WallClock));
            }
            if state.path.len() > config.ceiling.max_path_len {
                return Err(Error::SearchBudgetExceeded(BudgetKind::PathLength));
            }

            if state.node != start && start_seq.contains(&state.node) {
                match validate_cycle(&state.path, graph, backend, config)? {
                    CycleVerdict::Accepted(assertions) => {
                        findings.accepted.insert(
                            canonical(&state.path),
                            CycleRecord {
                                path: state.path,
                                assertions,
                            },
                        );
                        continue;
                    }
                    CycleVerdict::Undecided => {
                        tracing::warn!(path = ?state.path, "cycle left undecided by the solver");
                        findings.undecided.insert(canonical(&state.path));
                        continue;
                    }
                    CycleVerdict::Rejected => {}
                }
            }

            let mut neighbours = graph.neighbours(state.node);
            neighbours.sort_unstable_by_key(|&(n, _)| n);
            for (neighbour, kind) in neighbours {
                let unvisited = !state.path.contains(&neighbour) || neighbour == state.node;
                if !unvisited || state.edges.contains(&(neighbour, kind)) {
                    continue;
                }
                let mut path = state.path.clone();
                path.push(neighbour);
                if clone_families(&path, graph) > config.clone_budget {
                    continue;
                }
                let mut edges = state.edges.clone();
                edges.push((neighbour, kind));
                stack.push(SearchState {
                    node: neighbour,
                    path,
                    edges,
                });
            }
        }
    }

    tracing::debug!(
        accepted = findings.accepted.len(),
        undecided = findings.undecided.len(),
        "cycle search finished"
    );
    Ok(findings)
}

struct SearchState {
    node: UnitLabel,
    path: Vec<UnitLabel>,
    edges: Vec<(UnitLabel, EdgeKind)>,
}

/// Valid starting units: per business sequence, its first unit (unless
/// the sequence is a singleton or starts cloned), then every later unit
/// with no conflict edge to an already-chosen unit of that sequence.
pub(crate) fn starting_units(graph: &ConflictGraph) -> Vec<UnitLabel> {
    let mut starts = Vec::new();
    for seq in graph.business_sequences() {
        if seq.len() == 1 {
            continue;
        }
        if graph.meta(seq[0]).is_some_and(|m| m.cloned) {
            continue;
        }
        let mut chosen = vec![seq[0]];
        for &next in &seq[1..] {
            if !chosen.iter().any(|&c| graph.has_edge(c, next)) {
                chosen.push(next);
            }
        }
        starts.extend(chosen);
    }
    starts.sort_unstable();
    starts
}

/// Rotation-normalized cycle identity: the path rotated so its smallest
/// label comes first.
fn canonical(path: &[UnitLabel]) -> Vec<UnitLabel> {
    let Some(pivot) = path
        .iter()
        .enumerate()
        .min_by_key(|&(_, label)| label)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(path.len());
    rotated.extend_from_slice(&path[pivot..]);
    rotated.extend_from_slice(&path[..pivot]);
    rotated
}

/// Distinct business sequences contributing cloned units to `path`.
fn clone_families(path: &[UnitLabel], graph: &ConflictGraph) -> usize {
    let mut families = HashSet::new();
    for &n in path {
        if graph.meta(n).is_some_and(|m| m.cloned) {
            if let Some(index) = graph.sequence_index_of(n) {
                families.insert(index);
            }
        }
    }
    families.len()
}

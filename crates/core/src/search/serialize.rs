//! Per-cycle dependency DAGs and their linear extensions: the concrete
//! execution orderings realizing each anomaly.

use hashbrown::HashSet;

use crate::config::CheckConfig;
use crate::error::{BudgetKind, Error};
use crate::graph::{ConflictGraph, DiGraph, TopoSortError};
use crate::model::UnitLabel;
use crate::search::enumerate::CycleFindings;

/// The serialization outcome of every accepted cycle.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone)]
pub struct SerializationReport {
    /// Per distinct DAG: the representative cycle (canonical form) and
    /// every linear extension of its dependency DAG.
    pub per_cycle: Vec<(Vec<UnitLabel>, Vec<Vec<UnitLabel>>)>,
    /// Union of all orderings across cycles.
    pub all: HashSet<Vec<UnitLabel>>,
    /// Cycles whose derived graph turned out cyclic. The construction is
    /// meant to keep the graph acyclic; these are reported, not dropped
    /// silently.
    pub contradictions: Vec<Vec<UnitLabel>>,
}

/// Derive dependency DAGs for every accepted cycle and enumerate their
/// linear extensions.
///
/// Cycles whose DAGs coincide (same vertex and edge sets) are
/// deduplicated to one entry.
///
/// # Errors
///
/// [`Error::SearchBudgetExceeded`] once a DAG admits more than
/// `max_serializations` orderings.
pub fn derive_serializations(
    findings: &CycleFindings,
    graph: &ConflictGraph,
    config: &CheckConfig,
) -> Result<SerializationReport, Error> {
    let mut cycles: Vec<(&Vec<UnitLabel>, &Vec<UnitLabel>)> = findings
        .accepted
        .iter()
        .map(|(canonical, record)| (canonical, &record.path))
        .collect();
    cycles.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut dags: Vec<(Vec<UnitLabel>, DiGraph<UnitLabel>)> = Vec::new();
    for (canonical, path) in cycles {
        let dag = dependency_dag(graph, path)?;
        if !dags.iter().any(|(_, existing)| *existing == dag) {
            dags.push((canonical.clone(), dag));
        }
    }

    let mut report = SerializationReport::default();
    for (cycle, dag) in dags {
        match dag.all_topological_sorts(config.ceiling.max_serializations) {
            Ok(orderings) => {
                report.all.extend(orderings.iter().cloned());
                report.per_cycle.push((cycle, orderings));
            }
            Err(TopoSortError::Cyclic) => {
                tracing::warn!(?cycle, "derived dependency graph is cyclic");
                report.contradictions.push(cycle);
            }
            Err(TopoSortError::LimitExceeded) => {
                return Err(Error::SearchBudgetExceeded(BudgetKind::Serializations));
            }
        }
    }

    tracing::debug!(
        dags = report.per_cycle.len(),
        orderings = report.all.len(),
        contradictions = report.contradictions.len(),
        "serializations derived"
    );
    Ok(report)
}

/// Ordering constraints realizing one cycle.
///
/// For each cycle node, its business sequence contributes the chain of
/// consecutive-predecessor edges up to the node's own position. Then,
/// walking the cycle, each node connects forward to the first later cycle
/// node not already ordered before it; an edge that would close a loop
/// against the accumulated constraints is skipped and the walk advances
/// instead, keeping the graph acyclic.
fn dependency_dag(
    graph: &ConflictGraph,
    cycle: &[UnitLabel],
) -> Result<DiGraph<UnitLabel>, Error> {
    let mut dag: DiGraph<UnitLabel> = DiGraph::default();

    for (index, &node) in cycle.iter().enumerate() {
        let sequence = graph
            .sequence_of(node)
            .ok_or(Error::BrokenInvariant("unit missing from sequence registry"))?;
        for pair in sequence.windows(2) {
            if pair[1] > node {
                break;
            }
            dag.add_edge(pair[0], pair[1]);
        }

        for &next in &cycle[index + 1..] {
            if dag.has_path(&next, &node) {
                continue;
            }
            dag.add_edge(node, next);
            break;
        }
    }

    Ok(dag)
}

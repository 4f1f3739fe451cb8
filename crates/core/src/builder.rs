//! Drives the oracle over a flattened system to populate the conflict
//! graph.
//!
//! Every unordered unit pair across the whole system is probed once;
//! intra-transaction pairs are then probed again for data-flow edges (or
//! wired with unconditional sequence edges when data dependencies are
//! disabled). The first edge between a pair wins. Operator-declared
//! non-conflict overrides are applied strictly last, after every edge has
//! been added.

use crate::config::CheckConfig;
use crate::error::{Error, ModelError};
use crate::graph::{ConflictGraph, EdgeKind, NodeMeta};
use crate::model::{System, UnitLabel, UnitRef};
use crate::oracle::{self, EdgeProbe, UnitSite};
use crate::solver::{SatBackend, SolverVerdict};

/// Build the conflict graph of a flattened system.
///
/// # Errors
///
/// [`Error::BrokenInvariant`] if a remote unit survived flattening;
/// [`ModelError`] variants for unbound context inputs and dangling
/// non-conflict references.
pub fn build_graph<B: SatBackend>(
    system: &System,
    backend: &B,
    config: &CheckConfig,
) -> Result<ConflictGraph, Error> {
    let sites = oracle::unit_sites(system)?;
    let mut graph = ConflictGraph::default();

    for site in &sites {
        graph.add_node(
            site.label,
            NodeMeta {
                owner: site.owner.name.clone(),
                cloned: site.cloned,
            },
        );
    }

    for (i, a) in sites.iter().enumerate() {
        for b in &sites[i + 1..] {
            if config.predicate_precision {
                if let Some(probe) = oracle::probe_pair(backend, a, b)? {
                    apply_probe(&mut graph, a, b, EdgeKind::Predicate, probe);
                }
            } else if let Some(kind) = oracle::coarse_probe(a, b) {
                if !graph.has_edge(a.label, b.label) {
                    graph.add_edge(a.label, b.label, kind, vec![]);
                }
            }
        }
    }

    wire_transactions(system, backend, config, &mut graph)?;

    for (left, right) in &system.non_conflict_pairs {
        let l = resolve_unit_ref(system, left)?;
        let r = resolve_unit_ref(system, right)?;
        graph.remove_edge(l, r);
    }

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "conflict graph built"
    );
    Ok(graph)
}

/// Intra-transaction edges plus the business sequence registry.
fn wire_transactions<B: SatBackend>(
    system: &System,
    backend: &B,
    config: &CheckConfig,
    graph: &mut ConflictGraph,
) -> Result<(), Error> {
    for ms in &system.microservices {
        for bt in &ms.transactions {
            if config.data_dependencies {
                // output-to-input flow between any two units of the
                // transaction, solver-checked even in coarse mode
                for i in 0..bt.units.len() {
                    for j in i + 1..bt.units.len() {
                        let a = oracle::site_of(bt, i)?;
                        let b = oracle::site_of(bt, j)?;
                        if let Some(probe) = oracle::probe_pair(backend, &a, &b)? {
                            apply_probe(graph, &a, &b, EdgeKind::DataFlow, probe);
                        }
                    }
                }
            } else {
                for pair in bt.units.windows(2) {
                    if !graph.has_edge(pair[0].label, pair[1].label) {
                        graph.add_edge(
                            pair[0].label,
                            pair[1].label,
                            EdgeKind::Sequence,
                            vec![],
                        );
                    }
                }
            }

            graph.add_business_sequence(bt.units.iter().map(|u| u.label).collect());
        }
    }
    Ok(())
}

/// Turn one probe outcome into at most one edge. `Unknown` keeps the edge
/// conservatively, under a kind that marks it undecided.
fn apply_probe(
    graph: &mut ConflictGraph,
    a: &UnitSite<'_>,
    b: &UnitSite<'_>,
    kind: EdgeKind,
    probe: EdgeProbe,
) {
    if graph.has_edge(a.label, b.label) {
        return;
    }
    match probe.verdict {
        SolverVerdict::Sat => graph.add_edge(a.label, b.label, kind, probe.assertions),
        SolverVerdict::Unsat => {}
        SolverVerdict::Unknown => {
            tracing::warn!(
                a = %a.label,
                b = %b.label,
                "solver undecided on unit pair; keeping the edge",
            );
            graph.add_edge(a.label, b.label, EdgeKind::Unknown, probe.assertions);
        }
    }
}

fn resolve_unit_ref(system: &System, unit_ref: &UnitRef) -> Result<UnitLabel, Error> {
    let dangling = || {
        Error::ModelInconsistency(ModelError::DanglingNonConflict {
            transaction: unit_ref.transaction.clone(),
            index: unit_ref.index,
        })
    };
    let (mi, bi) = system
        .find_transaction(&unit_ref.transaction)
        .ok_or_else(dangling)?;
    system.microservices[mi].transactions[bi]
        .units
        .get(unit_ref.index)
        .map(|u| u.label)
        .ok_or_else(dangling)
}

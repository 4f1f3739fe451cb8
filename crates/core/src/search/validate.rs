//! Shape rules plus the satisfiability check that separate genuine
//! anomaly cycles from search artifacts.

use crate::config::CheckConfig;
use crate::error::Error;
use crate::graph::ConflictGraph;
use crate::model::{Expr, UnitLabel};
use crate::solver::{SatBackend, SolverVerdict};

use hashbrown::{HashMap, HashSet};

/// Outcome of validating one candidate cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleVerdict {
    /// The cycle passed every rule; carries its deduplicated satisfying
    /// assertion set.
    Accepted(Vec<Expr>),
    /// A shape rule failed, or the assertions are unsatisfiable.
    Rejected,
    /// Shape rules passed but the solver could not decide the assertions.
    Undecided,
}

/// Validate a candidate cycle `path` (start first, end last).
///
/// Rules, in order: some unit must lie outside the start's business
/// sequence; when start and end share a sequence the end's label must not
/// precede the start's; with the future-order rule on, each transaction's
/// units must appear in non-decreasing label order along the path; and
/// the conjunction of the stored assertions of every consecutive pair
/// must be satisfiable.
///
/// # Errors
///
/// [`Error::BrokenInvariant`] when the endpoints are owned by different
/// transactions, which the candidate rule is supposed to rule out.
pub fn validate_cycle<B: SatBackend>(
    path: &[UnitLabel],
    graph: &ConflictGraph,
    backend: &B,
    config: &CheckConfig,
) -> Result<CycleVerdict, Error> {
    let (&start, &end) = match (path.first(), path.last()) {
        (Some(s), Some(e)) => (s, e),
        _ => return Ok(CycleVerdict::Rejected),
    };
    let start_seq = graph
        .sequence_of(start)
        .ok_or(Error::BrokenInvariant("unit missing from sequence registry"))?;

    if path.iter().all(|n| start_seq.contains(n)) {
        return Ok(CycleVerdict::Rejected);
    }

    if graph.sequence_index_of(start) == graph.sequence_index_of(end) && end < start {
        return Ok(CycleVerdict::Rejected);
    }

    let owner_of = |n: UnitLabel| graph.meta(n).map(|m| m.owner.as_str());
    if owner_of(start) != owner_of(end) {
        return Err(Error::BrokenInvariant(
            "cycle endpoints owned by different transactions",
        ));
    }

    if config.future_order_only && !in_future_order(path, graph) {
        return Ok(CycleVerdict::Rejected);
    }

    let assertions = collect_assertions(path, graph);
    match backend.check_sat(&assertions) {
        SolverVerdict::Sat => Ok(CycleVerdict::Accepted(assertions)),
        SolverVerdict::Unsat => Ok(CycleVerdict::Rejected),
        SolverVerdict::Unknown => Ok(CycleVerdict::Undecided),
    }
}

/// Grouped by owning transaction, labels must appear in non-decreasing
/// order along the path.
fn in_future_order(path: &[UnitLabel], graph: &ConflictGraph) -> bool {
    let mut by_owner: HashMap<&str, UnitLabel> = HashMap::new();
    for &n in path {
        let Some(meta) = graph.meta(n) else {
            continue;
        };
        if let Some(&previous) = by_owner.get(meta.owner.as_str()) {
            if n < previous {
                return false;
            }
        }
        by_owner.insert(meta.owner.as_str(), n);
    }
    true
}

/// Stored assertions of every consecutive pair, simplified and deduped
/// keeping first-occurrence order.
fn collect_assertions(path: &[UnitLabel], graph: &ConflictGraph) -> Vec<Expr> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for pair in path.windows(2) {
        for expr in graph.assertions(pair[0], pair[1]) {
            let simplified = expr.simplify();
            if seen.insert(simplified.clone()) {
                out.push(simplified);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeMeta};
    use crate::solver::StructuralBackend;

    fn meta(owner: &str) -> NodeMeta {
        NodeMeta {
            owner: owner.into(),
            cloned: false,
        }
    }

    /// Sequences A = [1, 4], B = [2, 3], fully wired.
    fn two_sequence_graph() -> ConflictGraph {
        let mut g = ConflictGraph::default();
        for n in [1, 4] {
            g.add_node(UnitLabel(n), meta("A"));
        }
        for n in [2, 3] {
            g.add_node(UnitLabel(n), meta("B"));
        }
        for (a, b) in [(1, 2), (1, 3), (4, 2), (4, 3)] {
            g.add_edge(UnitLabel(a), UnitLabel(b), EdgeKind::Predicate, vec![]);
        }
        g.add_business_sequence(vec![UnitLabel(1), UnitLabel(4)]);
        g.add_business_sequence(vec![UnitLabel(2), UnitLabel(3)]);
        g
    }

    fn labels(ns: &[u32]) -> Vec<UnitLabel> {
        ns.iter().copied().map(UnitLabel).collect()
    }

    #[test]
    fn rejects_path_confined_to_one_sequence() {
        let g = two_sequence_graph();
        let verdict = validate_cycle(
            &labels(&[1, 4]),
            &g,
            &StructuralBackend,
            &CheckConfig::default(),
        )
        .expect("validates");
        assert_eq!(verdict, CycleVerdict::Rejected);
    }

    #[test]
    fn rejects_backward_return_within_start_sequence() {
        let g = two_sequence_graph();
        let verdict = validate_cycle(
            &labels(&[4, 2, 1]),
            &g,
            &StructuralBackend,
            &CheckConfig::default(),
        )
        .expect("validates");
        assert_eq!(verdict, CycleVerdict::Rejected);
    }

    #[test]
    fn mismatched_endpoint_owners_break_the_invariant() {
        let g = two_sequence_graph();
        // artificial path; the enumerator never produces one like it
        let result = validate_cycle(
            &labels(&[1, 2, 4, 3]),
            &g,
            &StructuralBackend,
            &CheckConfig::default(),
        );
        assert!(matches!(result, Err(Error::BrokenInvariant(_))));
    }

    #[test]
    fn future_order_rule_is_toggleable() {
        let g = two_sequence_graph();
        // owner B appears as 3 then 2: decreasing
        let path = labels(&[1, 3, 2, 4]);

        let strict = validate_cycle(&path, &g, &StructuralBackend, &CheckConfig::default())
            .expect("validates");
        assert_eq!(strict, CycleVerdict::Rejected);

        let lax = validate_cycle(
            &path,
            &g,
            &StructuralBackend,
            &CheckConfig::builder().future_order_only(false).build(),
        )
        .expect("validates");
        assert!(matches!(lax, CycleVerdict::Accepted(_)));
    }

    #[test]
    fn unsatisfiable_assertions_reject_the_cycle() {
        let mut g = two_sequence_graph();
        g.add_edge(
            UnitLabel(1),
            UnitLabel(2),
            EdgeKind::Predicate,
            vec![Expr::Lit(false)],
        );
        let verdict = validate_cycle(
            &labels(&[1, 2, 3, 4]),
            &g,
            &StructuralBackend,
            &CheckConfig::default(),
        )
        .expect("validates");
        assert_eq!(verdict, CycleVerdict::Rejected);
    }

    #[test]
    fn solver_unknown_leaves_the_cycle_undecided() {
        struct Agnostic;
        impl SatBackend for Agnostic {
            fn check_sat(&self, _assertions: &[Expr]) -> SolverVerdict {
                SolverVerdict::Unknown
            }
        }

        let g = two_sequence_graph();
        let verdict = validate_cycle(
            &labels(&[1, 2, 3, 4]),
            &g,
            &Agnostic,
            &CheckConfig::default(),
        )
        .expect("validates");
        assert_eq!(verdict, CycleVerdict::Undecided);
    }

    #[test]
    fn accepted_cycle_carries_deduplicated_assertions() {
        let mut g = two_sequence_graph();
        let guard = Expr::Cmp {
            op: crate::model::CmpOp::Gt,
            lhs: crate::model::Operand::Var(crate::model::SmtVar::new(
                "x@A",
                crate::model::VarSort::Int,
            )),
            rhs: crate::model::Operand::Lit(crate::model::Value::Int(0)),
        };
        g.add_edge(
            UnitLabel(1),
            UnitLabel(2),
            EdgeKind::Predicate,
            vec![guard.clone(), guard.clone()],
        );
        g.add_edge(
            UnitLabel(2),
            UnitLabel(3),
            EdgeKind::Predicate,
            vec![guard.clone()],
        );

        let verdict = validate_cycle(
            &labels(&[1, 2, 3, 4]),
            &g,
            &StructuralBackend,
            &CheckConfig::default(),
        )
        .expect("validates");
        assert_eq!(verdict, CycleVerdict::Accepted(vec![guard]));
    }
}

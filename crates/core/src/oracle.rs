//! The conflict oracle: decides whether a dependency edge must exist
//! between two units, and under which logical condition.
//!
//! Two conflict channels are probed per operation pair. A *variable-flow*
//! dependency applies only within one business transaction: an output
//! name of one operation intersects an input name of the other, in either
//! direction. A *table* dependency applies when both operations target
//! the same table, are not both reads, and their column footprints
//! intersect. Pairs matching neither channel contribute nothing.
//!
//! Matching pairs contribute one assertion each (the conjunction of
//! whichever guard predicates the two operations declare, or the
//! unconstrained `true` placeholder), bound against per-operation
//! variable contexts. Each unit additionally drags in causal history:
//! guards of earlier operations in its own transaction whose outputs feed
//! the unit's inputs. The backend then decides the conjunction; the
//! verdict stays tri-state.

use hashbrown::HashSet;

use crate::error::{Error, ModelError};
use crate::graph::EdgeKind;
use crate::model::{
    BusinessTransaction, Expr, LocalTransaction, OperationKind, SmtVar, System, UnitLabel, VarCtx,
};
use crate::solver::{SatBackend, SolverVerdict};

/// A flattened unit in place: its identity plus everything the context
/// construction needs from its surroundings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnitSite<'a> {
    pub label: UnitLabel,
    pub cloned: bool,
    pub owner: &'a BusinessTransaction,
    /// Position within `owner.units`.
    pub position: usize,
    pub lt: &'a LocalTransaction,
}

/// View `owner.units[position]` as a [`UnitSite`].
pub(crate) fn site_of(
    owner: &BusinessTransaction,
    position: usize,
) -> Result<UnitSite<'_>, Error> {
    let unit = &owner.units[position];
    let lt = unit
        .as_local()
        .ok_or(Error::BrokenInvariant("remote unit survived flattening"))?;
    Ok(UnitSite {
        label: unit.label,
        cloned: unit.cloned,
        owner,
        position,
        lt,
    })
}

/// Every unit of the flattened system, in declaration order.
pub(crate) fn unit_sites(system: &System) -> Result<Vec<UnitSite<'_>>, Error> {
    let mut sites = Vec::with_capacity(system.unit_count());
    for ms in &system.microservices {
        for bt in &ms.transactions {
            for position in 0..bt.units.len() {
                sites.push(site_of(bt, position)?);
            }
        }
    }
    Ok(sites)
}

/// Outcome of a precise pair probe: the backend's verdict over the
/// collected assertions, already simplified.
#[derive(Debug, Clone)]
pub(crate) struct EdgeProbe {
    pub verdict: SolverVerdict,
    pub assertions: Vec<Expr>,
}

/// Precise probe of one unordered unit pair.
///
/// `Ok(None)` means no operation pair matched any conflict channel; there
/// is no edge and nothing was solved. Otherwise the verdict decides:
/// `Sat` means the edge exists under the returned assertions, `Unsat`
/// refutes it, `Unknown` stays `Unknown`.
///
/// # Errors
///
/// [`ModelError::UnboundInput`] when an operation input of a matching
/// pair has no binding in its context.
pub(crate) fn probe_pair<B: SatBackend>(
    backend: &B,
    a: &UnitSite<'_>,
    b: &UnitSite<'_>,
) -> Result<Option<EdgeProbe>, Error> {
    let same_owner = a.owner.name == b.owner.name;
    let mut assertions: Vec<Expr> = Vec::new();

    for (i, o1) in a.lt.operations.iter().enumerate() {
        for (j, o2) in b.lt.operations.iter().enumerate() {
            let var_dep = same_owner
                && (names_intersect(o1.outputs(), o2.inputs())
                    || names_intersect(o2.outputs(), o1.inputs()));
            let table_dep = o1.table.name == o2.table.name
                && !(o1.kind == OperationKind::Read && o2.kind == OperationKind::Read)
                && o1.columns.intersection(&o2.columns).next().is_some();
            if !var_dep && !table_dep {
                continue;
            }

            // contexts are built for every matching pair, so an unbound
            // operation input surfaces even when no guard is declared
            let ctx1 = operation_ctx(a, i)?;
            let ctx2 = operation_ctx(b, j)?;
            let scope1 = format!("{}::{}", a.owner.name, o1.name);
            let scope2 = format!("{}::{}", b.owner.name, o2.name);

            let assertion = match (&o1.predicate, &o2.predicate) {
                (Some(p1), Some(p2)) => Expr::And(vec![
                    p1.bind(&ctx1, &scope1).map_err(Error::ModelInconsistency)?,
                    p2.bind(&ctx2, &scope2).map_err(Error::ModelInconsistency)?,
                ]),
                (Some(p1), None) => {
                    p1.bind(&ctx1, &scope1).map_err(Error::ModelInconsistency)?
                }
                (None, Some(p2)) => {
                    p2.bind(&ctx2, &scope2).map_err(Error::ModelInconsistency)?
                }
                (None, None) => Expr::TRUE,
            };
            assertions.push(assertion);
        }
    }

    if assertions.is_empty() {
        return Ok(None);
    }

    for site in [a, b] {
        conjoin_causal_history(site, &mut assertions)?;
    }

    let simplified: Vec<Expr> = assertions.iter().map(Expr::simplify).collect();
    let verdict = backend.check_sat(&simplified);
    Ok(Some(EdgeProbe {
        verdict,
        assertions: simplified,
    }))
}

/// Coarse probe: an edge exists iff some operation pair shares a table
/// and is not two reads. Predicates and column footprints are ignored.
/// The returned kind names the conflict channel.
pub(crate) fn coarse_probe(a: &UnitSite<'_>, b: &UnitSite<'_>) -> Option<EdgeKind> {
    for o1 in &a.lt.operations {
        for o2 in &b.lt.operations {
            if o1.table.name != o2.table.name {
                continue;
            }
            match (o1.kind, o2.kind) {
                (OperationKind::Write, OperationKind::Write) => {
                    return Some(EdgeKind::WriteWrite)
                }
                (OperationKind::Read, OperationKind::Write)
                | (OperationKind::Write, OperationKind::Read) => {
                    return Some(EdgeKind::ReadWrite)
                }
                (OperationKind::Read, OperationKind::Read) => {}
            }
        }
    }
    None
}

/// Guards of earlier operations in `site`'s transaction whose outputs
/// feed the unit's declared inputs, bound in their own contexts.
fn conjoin_causal_history(
    site: &UnitSite<'_>,
    assertions: &mut Vec<Expr>,
) -> Result<(), Error> {
    let inputs: HashSet<&str> = site.lt.inputs().collect();
    for past_position in 0..site.position {
        let past = site_of(site.owner, past_position)?;
        for (k, op) in past.lt.operations.iter().enumerate() {
            let Some(predicate) = &op.predicate else {
                continue;
            };
            if !op.outputs().any(|name| inputs.contains(name)) {
                continue;
            }
            let ctx = operation_ctx(&past, k)?;
            let scope = format!("{}::{}", past.owner.name, op.name);
            assertions.push(predicate.bind(&ctx, &scope).map_err(Error::ModelInconsistency)?);
        }
    }
    Ok(())
}

/// Per-unit context: transaction inputs scoped by the transaction name,
/// then outputs of earlier units scoped by this unit's label. Every
/// declared unit input must end up bound.
fn unit_ctx(site: &UnitSite<'_>) -> Result<VarCtx, Error> {
    let mut ctx = VarCtx::new();
    for p in site.owner.inputs() {
        ctx.insert(
            p.name.clone(),
            SmtVar::new(format!("{}@{}", p.name, site.owner.name), p.sort),
        );
    }
    for past_position in 0..site.position {
        let past = site_of(site.owner, past_position)?;
        for p in past.lt.output_params() {
            ctx.insert(
                p.name.clone(),
                SmtVar::new(format!("{}@{}", p.name, site.label), p.sort),
            );
        }
    }
    for name in site.lt.inputs() {
        if !ctx.contains_key(name) {
            return Err(Error::ModelInconsistency(ModelError::UnboundInput {
                scope: format!("{}::{}", site.owner.name, site.label),
                name: name.to_owned(),
            }));
        }
    }
    Ok(ctx)
}

/// Per-operation context: the unit context, then outputs of earlier
/// operations in the same unit scoped by unit label and producing
/// operation name.
fn operation_ctx(site: &UnitSite<'_>, op_index: usize) -> Result<VarCtx, Error> {
    let mut ctx = unit_ctx(site)?;
    for prior in &site.lt.operations[..op_index] {
        for p in prior.output_params() {
            ctx.insert(
                p.name.clone(),
                SmtVar::new(
                    format!("{}@{}.{}", p.name, site.label, prior.name),
                    p.sort,
                ),
            );
        }
    }
    let op = &site.lt.operations[op_index];
    for name in op.inputs() {
        if !ctx.contains_key(name) {
            return Err(Error::ModelInconsistency(ModelError::UnboundInput {
                scope: format!("{}::{}", site.owner.name, op.name),
                name: name.to_owned(),
            }));
        }
    }
    Ok(ctx)
}

fn names_intersect<'x>(
    a: impl Iterator<Item = &'x str>,
    b: impl Iterator<Item = &'x str>,
) -> bool {
    let set: HashSet<&str> = a.collect();
    b.into_iter().any(|name| set.contains(name))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{
        CmpOp, Column, Operation, Parameter, Predicate, Table, Term, Unit, VarSort,
    };
    use crate::solver::StructuralBackend;

    fn table(name: &str) -> Arc<Table> {
        Table::new(name, vec![Column::new("id", VarSort::Int)])
    }

    fn unit(ops: Vec<Operation>, params: Vec<Parameter>) -> Unit {
        Unit::local(LocalTransaction::new(ops, params).expect("valid lt"))
    }

    fn bt(name: &str, units: Vec<Unit>, params: Vec<Parameter>) -> BusinessTransaction {
        let mut bt = BusinessTransaction::new(name, units, params).expect("valid bt");
        let mut label = 1;
        for u in &mut bt.units {
            u.label = UnitLabel(label);
            label += 1;
        }
        bt
    }

    #[test]
    fn both_reads_produce_no_edge() {
        let t = table("t");
        let read = |n: &str| Operation::new(n, OperationKind::Read, &t, vec![]);
        let bt1 = bt("bt1", vec![unit(vec![read("r1")], vec![])], vec![]);
        let bt2 = bt("bt2", vec![unit(vec![read("r2")], vec![])], vec![]);
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        assert!(probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .is_none());
        assert_eq!(coarse_probe(&a, &b), None);
    }

    #[test]
    fn write_conflict_yields_placeholder_assertion() {
        let t = table("t");
        let bt1 = bt(
            "bt1",
            vec![unit(
                vec![Operation::new("w1", OperationKind::Write, &t, vec![])],
                vec![],
            )],
            vec![],
        );
        let bt2 = bt(
            "bt2",
            vec![unit(
                vec![Operation::new("w2", OperationKind::Write, &t, vec![])],
                vec![],
            )],
            vec![],
        );
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        let probe = probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .expect("edge");
        assert_eq!(probe.verdict, SolverVerdict::Sat);
        assert_eq!(probe.assertions, vec![Expr::Lit(true)]);
        assert_eq!(coarse_probe(&a, &b), Some(EdgeKind::WriteWrite));
    }

    #[test]
    fn disjoint_column_footprints_produce_no_edge() {
        let t = Table::new(
            "t",
            vec![
                Column::new("a", VarSort::Int),
                Column::new("b", VarSort::Int),
            ],
        );
        let w1 = Operation::new("w1", OperationKind::Write, &t, vec![])
            .with_columns(["a".to_owned()]);
        let w2 = Operation::new("w2", OperationKind::Write, &t, vec![])
            .with_columns(["b".to_owned()]);
        let bt1 = bt("bt1", vec![unit(vec![w1], vec![])], vec![]);
        let bt2 = bt("bt2", vec![unit(vec![w2], vec![])], vec![]);
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        assert!(probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .is_none());
        // the coarse probe ignores footprints and still reports a conflict
        assert_eq!(coarse_probe(&a, &b), Some(EdgeKind::WriteWrite));
    }

    #[test]
    fn variable_flow_applies_only_within_one_transaction() {
        let t1 = table("t1");
        let t2 = table("t2");
        let producer = Operation::new(
            "produce",
            OperationKind::Read,
            &t1,
            vec![Parameter::output("x", VarSort::Int)],
        );
        let consumer = Operation::new(
            "consume",
            OperationKind::Read,
            &t2,
            vec![Parameter::input("x", VarSort::Int)],
        );

        let same = bt(
            "same",
            vec![
                unit(vec![producer.clone()], vec![Parameter::output("x", VarSort::Int)]),
                unit(vec![consumer.clone()], vec![Parameter::input("x", VarSort::Int)]),
            ],
            vec![],
        );
        let a = site_of(&same, 0).expect("site");
        let b = site_of(&same, 1).expect("site");
        assert!(probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .is_some());

        // split across two transactions the same pair has no channel
        let left = bt(
            "left",
            vec![unit(vec![producer], vec![Parameter::output("x", VarSort::Int)])],
            vec![],
        );
        let right = bt(
            "right",
            vec![unit(vec![consumer], vec![])],
            vec![Parameter::input("x", VarSort::Int)],
        );
        let a = site_of(&left, 0).expect("site");
        let b = site_of(&right, 0).expect("site");
        assert!(probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .is_none());
    }

    #[test]
    fn contradictory_guard_refutes_the_edge() {
        let t = table("t");
        let guarded = Operation::new("w1", OperationKind::Write, &t, vec![])
            .with_predicate(Predicate::cmp(CmpOp::Lt, Term::int(1), Term::int(0)));
        let bt1 = bt("bt1", vec![unit(vec![guarded], vec![])], vec![]);
        let bt2 = bt(
            "bt2",
            vec![unit(
                vec![Operation::new("w2", OperationKind::Write, &t, vec![])],
                vec![],
            )],
            vec![],
        );
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        let probe = probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .expect("matched");
        assert_eq!(probe.verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn transaction_inputs_scope_by_transaction_name() {
        let t = table("t");
        let guarded = Operation::new(
            "w",
            OperationKind::Write,
            &t,
            vec![Parameter::input("amount", VarSort::Int)],
        )
        .with_predicate(Predicate::cmp(CmpOp::Gt, Term::param("amount"), Term::int(0)));
        let bt1 = bt(
            "transfer",
            vec![unit(vec![guarded], vec![Parameter::input("amount", VarSort::Int)])],
            vec![Parameter::input("amount", VarSort::Int)],
        );
        let bt2 = bt(
            "audit",
            vec![unit(
                vec![Operation::new("w2", OperationKind::Write, &t, vec![])],
                vec![],
            )],
            vec![],
        );
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        let probe = probe_pair(&StructuralBackend, &a, &b)
            .expect("probes")
            .expect("edge");
        let expected = Expr::Cmp {
            op: CmpOp::Gt,
            lhs: crate::model::Operand::Var(SmtVar::new("amount@transfer", VarSort::Int)),
            rhs: crate::model::Operand::Lit(crate::model::Value::Int(0)),
        };
        assert_eq!(probe.assertions, vec![expected]);
    }

    #[test]
    fn unbound_operation_input_is_fatal() {
        let t = table("t");
        let needy = Operation::new(
            "w",
            OperationKind::Write,
            &t,
            vec![Parameter::input("ghost", VarSort::Int)],
        );
        let bt1 = bt("bt1", vec![unit(vec![needy], vec![])], vec![]);
        let bt2 = bt(
            "bt2",
            vec![unit(
                vec![Operation::new("w2", OperationKind::Write, &t, vec![])],
                vec![],
            )],
            vec![],
        );
        let a = site_of(&bt1, 0).expect("site");
        let b = site_of(&bt2, 0).expect("site");

        assert!(matches!(
            probe_pair(&StructuralBackend, &a, &b),
            Err(Error::ModelInconsistency(ModelError::UnboundInput { name, .. }))
                if name == "ghost"
        ));
    }
}

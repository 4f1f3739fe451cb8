mod common;

use hashbrown::HashSet;
use sagacheck_core::model::{
    BusinessTransaction, Column, LocalTransaction, Microservice, Operation, OperationKind,
    Parameter, System, Table, Unit, UnitLabel, UnitRef, VarSort,
};
use sagacheck_core::{
    check, flatten, BudgetKind, CheckConfig, Error, ModelError, SearchCeiling,
    StructuralBackend,
};

fn labels(ns: &[u32]) -> Vec<UnitLabel> {
    ns.iter().copied().map(UnitLabel).collect()
}

fn run(system: System, config: &CheckConfig) -> sagacheck_core::Report {
    check(system, &StructuralBackend, config).expect("pipeline succeeds")
}

#[test]
fn two_table_scenario_yields_the_expected_serializations() {
    let report = run(common::two_table_scenario(), &CheckConfig::default());

    assert_eq!(report.findings.accepted.len(), 1);
    assert!(report.findings.undecided.is_empty());
    let record = report
        .findings
        .accepted
        .get(&labels(&[1, 4, 3]))
        .expect("the read-write-read round trip");
    assert_eq!(record.path, labels(&[1, 4, 3]));

    let expected: HashSet<Vec<UnitLabel>> =
        [labels(&[1, 2, 4, 3]), labels(&[1, 4, 2, 3])].into_iter().collect();
    assert_eq!(report.serializations.all, expected);
    assert!(report.serializations.contradictions.is_empty());
}

#[test]
fn read_only_systems_have_no_cycles() {
    let report = run(common::read_only_system(), &CheckConfig::default());
    assert!(report.is_serializable());
    assert_eq!(report.graph.edge_count(), 0);
}

#[test]
fn disjoint_tables_produce_zero_cycles() {
    let report = run(common::disjoint_tables_system(), &CheckConfig::default());
    assert!(report.is_serializable());
}

#[test]
fn flattening_inlines_remote_calls_and_drops_internal_transactions() {
    let flat = flatten(common::remote_call_system()).expect("flattens");
    let names: Vec<&str> = flat.microservices[0]
        .transactions
        .iter()
        .map(|bt| bt.name.as_str())
        .collect();
    assert_eq!(names, vec!["order", "order#clone"]);

    let order = &flat.microservices[0].transactions[0];
    assert_eq!(order.units.len(), 2);
    assert!(order.units.iter().all(|u| u.as_local().is_some()));
}

#[test]
fn flattening_twice_preserves_counts_and_labels() {
    let once = flatten(common::two_table_scenario()).expect("first");
    let twice = flatten(once.clone()).expect("second");
    assert_eq!(once.unit_count(), twice.unit_count());
    assert_eq!(once, twice);
}

#[test]
fn clone_budget_gates_concurrent_overlap_anomalies() {
    let sequential = run(common::remote_call_system(), &CheckConfig::default());
    assert!(sequential.is_serializable());

    let concurrent = run(
        common::remote_call_system(),
        &CheckConfig::builder().clone_budget(1).build(),
    );
    assert!(!concurrent.is_serializable());
    assert!(concurrent
        .findings
        .accepted
        .values()
        .any(|record| record.path.iter().any(|&n| {
            concurrent
                .graph
                .meta(n)
                .is_some_and(|meta| meta.cloned)
        })));
}

#[test]
fn accepted_cycles_respect_future_order() {
    let report = run(common::two_table_scenario(), &CheckConfig::default());
    for record in report.findings.accepted.values() {
        let mut last_by_owner: std::collections::HashMap<&str, UnitLabel> =
            std::collections::HashMap::new();
        for &n in &record.path {
            let owner = report.graph.meta(n).expect("meta").owner.as_str();
            if let Some(&previous) = last_by_owner.get(owner) {
                assert!(previous <= n, "owner {owner} went backward in {:?}", record.path);
            }
            last_by_owner.insert(owner, n);
        }
    }
}

#[test]
fn non_conflict_override_never_adds_cycles() {
    let baseline = run(common::two_table_scenario(), &CheckConfig::default());
    let overridden = run(
        common::two_table_scenario()
            .with_non_conflict_pairs(vec![(UnitRef::new("bt1", 0), UnitRef::new("bt2", 0))]),
        &CheckConfig::default(),
    );
    assert!(overridden.findings.accepted.len() <= baseline.findings.accepted.len());
}

// Two read-only transactions over disjoint tables cannot conflict, but a
// shared name would make the oracle treat them as one owner and fabricate
// a variable-flow edge between them. Name reuse must be rejected up front.
#[test]
fn name_reuse_across_microservices_cannot_fabricate_conflicts() {
    let inventory = Table::new("inventory", vec![Column::new("sku", VarSort::Str)]);
    let shipping = Table::new("shipping", vec![Column::new("sku", VarSort::Str)]);

    let producer = BusinessTransaction::new(
        "bt",
        vec![Unit::local(
            LocalTransaction::new(
                vec![Operation::new(
                    "lookup",
                    OperationKind::Read,
                    &inventory,
                    vec![Parameter::output("sku", VarSort::Str)],
                )],
                vec![],
            )
            .expect("producer lt"),
        )],
        vec![],
    )
    .expect("producer");
    let consumer = BusinessTransaction::new(
        "bt",
        vec![Unit::local(
            LocalTransaction::new(
                vec![Operation::new(
                    "track",
                    OperationKind::Read,
                    &shipping,
                    vec![Parameter::input("sku", VarSort::Str)],
                )],
                vec![],
            )
            .expect("consumer lt"),
        )],
        vec![],
    )
    .expect("consumer");

    let system = System::new(vec![
        Microservice::new("warehouse", vec![producer]),
        Microservice::new("courier", vec![consumer]),
    ]);
    assert!(matches!(
        check(system, &StructuralBackend, &CheckConfig::default()),
        Err(Error::ModelInconsistency(ModelError::DuplicateTransaction { name }))
            if name == "bt"
    ));
}

#[test]
fn checking_twice_is_deterministic() {
    let first = run(common::two_table_scenario(), &CheckConfig::default());
    let second = run(common::two_table_scenario(), &CheckConfig::default());
    assert_eq!(first.graph.canonical_sets(), second.graph.canonical_sets());
    assert_eq!(first.serializations.all, second.serializations.all);
}

#[cfg(feature = "serde")]
#[test]
fn systems_and_configs_round_trip_through_json() {
    let system = common::remote_call_system();
    let json = serde_json::to_string(&system).expect("system serializes");
    let back: System = serde_json::from_str(&json).expect("system deserializes");
    assert_eq!(back, system);

    let config = CheckConfig::builder().clone_budget(1).build();
    let json = serde_json::to_string(&config).expect("config serializes");
    let back: CheckConfig = serde_json::from_str(&json).expect("config deserializes");
    assert_eq!(back, config);
}

#[test]
fn exhausted_wall_clock_budget_is_an_explicit_error() {
    let config = CheckConfig::builder()
        .ceiling(SearchCeiling::builder().max_time(std::time::Duration::ZERO).build())
        .build();
    let result = check(common::two_table_scenario(), &StructuralBackend, &config);
    assert!(matches!(
        result,
        Err(Error::SearchBudgetExceeded(BudgetKind::WallClock))
    ));
}

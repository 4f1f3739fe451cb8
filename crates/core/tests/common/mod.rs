//! Shared fixture systems for the integration tests.

use sagacheck_core::model::{
    BusinessTransaction, Column, LocalTransaction, Microservice, Operation, OperationKind,
    System, Table, Unit, VarSort,
};

fn unit(op: Operation) -> Unit {
    Unit::local(LocalTransaction::new(vec![op], vec![]).expect("valid local transaction"))
}

/// The minimal two-table round trip: `bt1` reads table `a`, writes table
/// `b`, reads `a` again; `bt2` writes `a`. A `bt2` execution slipping
/// between the two reads makes `bt1` observe inconsistent state.
pub fn two_table_scenario() -> System {
    let a = Table::new("a", vec![Column::new("id", VarSort::Int)]);
    let b = Table::new("b", vec![Column::new("id", VarSort::Int)]);

    let bt1 = BusinessTransaction::new(
        "bt1",
        vec![
            unit(Operation::new("read_a_first", OperationKind::Read, &a, vec![])),
            unit(Operation::new("write_b", OperationKind::Write, &b, vec![])),
            unit(Operation::new("read_a_again", OperationKind::Read, &a, vec![])),
        ],
        vec![],
    )
    .expect("bt1");
    let bt2 = BusinessTransaction::new(
        "bt2",
        vec![unit(Operation::new("write_a", OperationKind::Write, &a, vec![]))],
        vec![],
    )
    .expect("bt2");

    System::new(vec![Microservice::new("ms", vec![bt1, bt2])])
}

/// Two transactions that only ever read one shared table.
pub fn read_only_system() -> System {
    let t = Table::new("catalog", vec![Column::new("sku", VarSort::Str)]);
    let browse = BusinessTransaction::new(
        "browse",
        vec![
            unit(Operation::new("list", OperationKind::Read, &t, vec![])),
            unit(Operation::new("detail", OperationKind::Read, &t, vec![])),
        ],
        vec![],
    )
    .expect("browse");
    let search = BusinessTransaction::new(
        "search",
        vec![
            unit(Operation::new("query", OperationKind::Read, &t, vec![])),
            unit(Operation::new("rank", OperationKind::Read, &t, vec![])),
        ],
        vec![],
    )
    .expect("search");
    System::new(vec![Microservice::new("shop", vec![browse, search])])
}

/// Two write-heavy transactions over fully disjoint tables.
pub fn disjoint_tables_system() -> System {
    let left = Table::new("left", vec![Column::new("id", VarSort::Int)]);
    let right = Table::new("right", vec![Column::new("id", VarSort::Int)]);
    let bt1 = BusinessTransaction::new(
        "bt1",
        vec![
            unit(Operation::new("read_left", OperationKind::Read, &left, vec![])),
            unit(Operation::new("write_left", OperationKind::Write, &left, vec![])),
        ],
        vec![],
    )
    .expect("bt1");
    let bt2 = BusinessTransaction::new(
        "bt2",
        vec![
            unit(Operation::new("read_right", OperationKind::Read, &right, vec![])),
            unit(Operation::new("write_right", OperationKind::Write, &right, vec![])),
        ],
        vec![],
    )
    .expect("bt2");
    System::new(vec![Microservice::new("ms", vec![bt1, bt2])])
}

/// An `order` workflow that remote-calls an internal `audit` transaction
/// writing the table `order` itself reads.
pub fn remote_call_system() -> System {
    let log = Table::new("log", vec![Column::new("entry", VarSort::Str)]);
    let audit = BusinessTransaction::new(
        "audit",
        vec![unit(Operation::new("append", OperationKind::Write, &log, vec![]))],
        vec![],
    )
    .expect("audit")
    .internal();
    let order = BusinessTransaction::new(
        "order",
        vec![
            unit(Operation::new("inspect", OperationKind::Read, &log, vec![])),
            Unit::remote("audit"),
        ],
        vec![],
    )
    .expect("order");
    System::new(vec![Microservice::new("ms", vec![audit, order])])
}

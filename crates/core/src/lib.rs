//! Static serializability-anomaly verification for declared microservice
//! architectures.
//!
//! Given a [`model::System`] describing microservices, their business
//! transactions (ordered workflows of local database transactions and
//! remote calls) and the tables each operation touches, the pipeline
//! decides whether concurrent executions can interleave into a
//! non-serializable cycle, and enumerates the concrete execution
//! orderings realizing each one.
//!
//! The pipeline is staged, not a state machine: [`flatten`] inlines
//! remote calls and synthesizes concurrent-clone siblings,
//! [`build_graph`] probes every unit pair through the conflict oracle to
//! populate the conflict graph, [`find_cycles`] runs the bounded DFS with
//! shape and satisfiability validation, and [`derive_serializations`]
//! turns each accepted cycle into a dependency DAG and its linear
//! extensions. [`check`] runs all four.
//!
//! Satisfiability goes through the [`solver::SatBackend`] trait. The
//! built-in [`solver::StructuralBackend`] is a cheap conservative
//! approximation, exact for systems without guard predicates; the
//! `sagacheck_smt` crate provides the precise lazy-SMT backend.
//!
//! ```
//! use sagacheck_core::model::{
//!     BusinessTransaction, Column, LocalTransaction, Microservice, Operation,
//!     OperationKind, System, Table, Unit, VarSort,
//! };
//! use sagacheck_core::{check, CheckConfig, StructuralBackend};
//!
//! let accounts = Table::new("accounts", vec![Column::new("id", VarSort::Int)]);
//! let audit = Table::new("audit", vec![Column::new("entry", VarSort::Str)]);
//! let unit = |op: Operation| Unit::local(LocalTransaction::new(vec![op], vec![]).unwrap());
//!
//! let transfer = BusinessTransaction::new(
//!     "transfer",
//!     vec![
//!         unit(Operation::new("check_balance", OperationKind::Read, &accounts, vec![])),
//!         unit(Operation::new("log", OperationKind::Write, &audit, vec![])),
//!         unit(Operation::new("verify", OperationKind::Read, &accounts, vec![])),
//!     ],
//!     vec![],
//! )
//! .unwrap();
//! let deposit = BusinessTransaction::new(
//!     "deposit",
//!     vec![unit(Operation::new("credit", OperationKind::Write, &accounts, vec![]))],
//!     vec![],
//! )
//! .unwrap();
//!
//! let system = System::new(vec![Microservice::new("bank", vec![transfer, deposit])]);
//! let report = check(system, &StructuralBackend, &CheckConfig::default()).unwrap();
//! assert!(!report.is_serializable());
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod flatten;
pub mod graph;
pub mod model;
mod oracle;
pub mod search;
pub mod solver;

pub use builder::build_graph;
pub use config::{CheckConfig, SearchCeiling};
pub use error::{BudgetKind, Error, ModelError};
pub use flatten::flatten;
pub use graph::{ConflictGraph, EdgeKind};
pub use search::{
    derive_serializations, find_cycles, CycleFindings, CycleRecord, SerializationReport,
};
pub use solver::{SatBackend, SolverVerdict, StructuralBackend};

use model::System;

/// Outcome of a full verification run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Report {
    /// The flattened system the graph was built from.
    pub system: System,
    pub graph: ConflictGraph,
    pub findings: CycleFindings,
    pub serializations: SerializationReport,
}

impl Report {
    /// No anomaly cycle was accepted and none was left undecided.
    #[must_use]
    pub fn is_serializable(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Run the whole pipeline: flatten, build the conflict graph, enumerate
/// and validate cycles, derive serializations.
///
/// # Errors
///
/// Any [`Error`] raised by the individual stages: model inconsistencies,
/// exceeded search ceilings, broken internal invariants.
pub fn check<B: SatBackend>(
    system: System,
    backend: &B,
    config: &CheckConfig,
) -> Result<Report, Error> {
    let system = flatten::flatten(system)?;
    let graph = builder::build_graph(&system, backend, config)?;
    let findings = search::find_cycles(&graph, backend, config)?;
    let serializations = search::derive_serializations(&findings, &graph, config)?;
    Ok(Report {
        system,
        graph,
        findings,
        serializations,
    })
}

//! Declarative model of a microservice architecture.
//!
//! A [`System`] owns [`Microservice`]s, each exposing named
//! [`BusinessTransaction`]s: ordered workflows of [`Unit`]s. A unit either
//! executes a sequence of [`Operation`]s against the local database
//! atomically ([`LocalTransaction`]) or invokes another business
//! transaction by name ([`UnitKind::Remote`]); remote units are inlined
//! away by [`flatten`](crate::flatten::flatten) before any graph is built.
//!
//! Construction enforces the output-producibility invariant: every output
//! parameter a transaction (or local transaction) declares must be
//! producible by one of its children. Violations are fatal
//! [`ModelError`]s, never recovered from.

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::ModelError;

pub mod predicate;

pub use predicate::{CmpOp, Expr, Operand, Predicate, SmtVar, Term, Value, VarCtx, VarSort};

/// Synthetic per-unit id minted by relabelling during flattening.
///
/// Labels are reassigned `1..=n` on every flattening pass; only the final
/// pass's labels are meaningful. They are unique across the flattened
/// system and double as the total-order proxy consumed by the cycle
/// validator's shape rules. Graph nodes are keyed by label (identity), so
/// cloned units are distinct nodes even when structurally identical.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitLabel(pub u32);

impl fmt::Display for UnitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Positional reference to a unit, used to declare non-conflicting pairs
/// before labels exist.
///
/// Resolved against the flattened system when the graph is built; a
/// reference that names an unknown transaction or an out-of-range index is
/// a [`ModelError::DanglingNonConflict`].
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitRef {
    pub transaction: String,
    pub index: usize,
}

impl UnitRef {
    pub fn new(transaction: impl Into<String>, index: usize) -> Self {
        Self {
            transaction: transaction.into(),
            index,
        }
    }
}

/// Static schema of one table.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            columns,
        })
    }

    /// Names of every column, the default footprint of an operation that
    /// does not restrict its columns.
    #[must_use]
    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// One column of a table.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sort: VarSort,
}

impl Column {
    pub fn new(name: impl Into<String>, sort: VarSort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

/// Whether a parameter flows into or out of its owner.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A named, sorted parameter of a transaction, unit, or operation.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub sort: VarSort,
    pub direction: Direction,
}

impl Parameter {
    pub fn input(name: impl Into<String>, sort: VarSort) -> Self {
        Self {
            name: name.into(),
            sort,
            direction: Direction::Input,
        }
    }

    pub fn output(name: impl Into<String>, sort: VarSort) -> Self {
        Self {
            name: name.into(),
            sort,
            direction: Direction::Output,
        }
    }
}

/// Filters a parameter list down to one direction, yielding names.
fn names_of(params: &[Parameter], direction: Direction) -> impl Iterator<Item = &str> {
    params
        .iter()
        .filter(move |p| p.direction == direction)
        .map(|p| p.name.as_str())
}

/// READ or WRITE against a table.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
}

/// One read or write with a column footprint and an optional guard.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    pub table: Arc<Table>,
    /// Columns this operation touches. Defaults to every column of the
    /// table when constructed without an explicit footprint.
    pub columns: BTreeSet<String>,
    pub params: Vec<Parameter>,
    pub predicate: Option<Predicate>,
}

impl Operation {
    /// An operation touching every column of `table`, without a guard.
    pub fn new(
        name: impl Into<String>,
        kind: OperationKind,
        table: &Arc<Table>,
        params: Vec<Parameter>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: table.column_names(),
            table: Arc::clone(table),
            params,
            predicate: None,
        }
    }

    /// Restrict the column footprint. An empty set keeps the default
    /// (all columns).
    #[must_use]
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        let restricted: BTreeSet<String> = columns.into_iter().collect();
        if !restricted.is_empty() {
            self.columns = restricted;
        }
        self
    }

    /// Attach a guard predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        names_of(&self.params, Direction::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        names_of(&self.params, Direction::Output)
    }

    /// Output parameters with their sorts, for context construction.
    pub fn output_params(&self) -> impl Iterator<Item = &Parameter> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::Output)
    }
}

/// Atomic sequence of operations against the local database.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTransaction {
    pub operations: Vec<Operation>,
    pub params: Vec<Parameter>,
}

impl LocalTransaction {
    /// # Errors
    ///
    /// Returns [`ModelError::UndeclaredOutput`] if a declared output is not
    /// produced by any operation.
    pub fn new(operations: Vec<Operation>, params: Vec<Parameter>) -> Result<Self, ModelError> {
        for out in names_of(&params, Direction::Output) {
            let produced = operations.iter().any(|op| op.outputs().any(|o| o == out));
            if !produced {
                return Err(ModelError::UndeclaredOutput {
                    owner: "local transaction".into(),
                    output: out.into(),
                });
            }
        }
        Ok(Self { operations, params })
    }

    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        names_of(&self.params, Direction::Input)
    }

    pub fn output_params(&self) -> impl Iterator<Item = &Parameter> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::Output)
    }
}

/// What a unit does: run locally, or call out to another transaction.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Local(LocalTransaction),
    /// Invocation of another business transaction, by name. Must not
    /// survive flattening.
    Remote(String),
}

/// One step of a business transaction's workflow.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub label: UnitLabel,
    /// Set on units of synthesized concurrent-clone sibling transactions.
    pub cloned: bool,
    pub kind: UnitKind,
}

impl Unit {
    #[must_use]
    pub const fn local(lt: LocalTransaction) -> Self {
        Self {
            label: UnitLabel(0),
            cloned: false,
            kind: UnitKind::Local(lt),
        }
    }

    pub fn remote(target: impl Into<String>) -> Self {
        Self {
            label: UnitLabel(0),
            cloned: false,
            kind: UnitKind::Remote(target.into()),
        }
    }

    /// The local transaction behind this unit, or `None` for a remote
    /// unit. Post-flattening callers treat `None` as
    /// [`Error::BrokenInvariant`](crate::error::Error::BrokenInvariant).
    #[must_use]
    pub const fn as_local(&self) -> Option<&LocalTransaction> {
        match &self.kind {
            UnitKind::Local(lt) => Some(lt),
            UnitKind::Remote(_) => None,
        }
    }
}

/// Named workflow exposed by a microservice.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessTransaction {
    pub name: String,
    pub units: Vec<Unit>,
    pub params: Vec<Parameter>,
    /// Internal transactions exist only as remote-call targets; they are
    /// dropped from the visible list once flattening has inlined them.
    pub internal: bool,
}

impl BusinessTransaction {
    /// # Errors
    ///
    /// Returns [`ModelError::UndeclaredOutput`] if a declared output is not
    /// producible by any child unit's output set. Remote units are opaque
    /// here; their outputs are checked after inlining.
    pub fn new(
        name: impl Into<String>,
        units: Vec<Unit>,
        params: Vec<Parameter>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        for out in names_of(&params, Direction::Output) {
            let produced = units.iter().any(|u| match &u.kind {
                UnitKind::Local(lt) => lt.output_params().any(|p| p.name == out),
                // a remote call may surface the output once inlined
                UnitKind::Remote(_) => true,
            });
            if !produced {
                return Err(ModelError::UndeclaredOutput {
                    owner: name,
                    output: out.into(),
                });
            }
        }
        Ok(Self {
            name,
            units,
            params,
            internal: false,
        })
    }

    /// Mark as internal-only (invocable solely through remote calls).
    #[must_use]
    pub const fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Parameter> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::Input)
    }
}

/// A named microservice owning an ordered list of business transactions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Microservice {
    pub name: String,
    pub transactions: Vec<BusinessTransaction>,
}

impl Microservice {
    pub fn new(name: impl Into<String>, transactions: Vec<BusinessTransaction>) -> Self {
        Self {
            name: name.into(),
            transactions,
        }
    }
}

/// The whole declared architecture.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub microservices: Vec<Microservice>,
    /// Operator-declared commuting unit pairs; their conflict edges are
    /// removed after graph construction.
    pub non_conflict_pairs: Vec<(UnitRef, UnitRef)>,
}

impl System {
    #[must_use]
    pub const fn new(microservices: Vec<Microservice>) -> Self {
        Self {
            microservices,
            non_conflict_pairs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_non_conflict_pairs(mut self, pairs: Vec<(UnitRef, UnitRef)>) -> Self {
        self.non_conflict_pairs = pairs;
        self
    }

    /// Locate a visible or internal transaction by name.
    #[must_use]
    pub fn find_transaction(&self, name: &str) -> Option<(usize, usize)> {
        self.microservices.iter().enumerate().find_map(|(mi, ms)| {
            ms.transactions
                .iter()
                .position(|bt| bt.name == name)
                .map(|bi| (mi, bi))
        })
    }

    /// Total number of units across all transactions.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.microservices
            .iter()
            .flat_map(|ms| &ms.transactions)
            .map(|bt| bt.units.len())
            .sum()
    }
}

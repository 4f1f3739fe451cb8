use derive_more::From;

/// Fatal inconsistency in the declared model.
///
/// Raised during construction or flattening; never retried.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A declared output parameter is not produced by any child.
    UndeclaredOutput { owner: String, output: String },
    /// A remote unit references a transaction that does not exist.
    DanglingRemote { owner: String, target: String },
    /// Two transactions share a name. Names are the identity key for
    /// remote targets, unit references, and conflict probing, so reuse
    /// across microservices would silently alias distinct transactions.
    DuplicateTransaction { name: String },
    /// A declared input has no binding in its variable context.
    UnboundInput { scope: String, name: String },
    /// A non-conflict override references an unknown transaction or an
    /// out-of-range unit index.
    DanglingNonConflict { transaction: String, index: usize },
}

/// Which configured ceiling the search ran into.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    /// A DFS path grew past `max_path_len`.
    PathLength,
    /// Linear-extension enumeration passed `max_serializations`.
    Serializations,
    /// The wall-clock budget ran out.
    WallClock,
}

/// Error returned by the verification pipeline.
#[derive(Debug, From)]
pub enum Error {
    /// The declared model violates a construction invariant.
    ModelInconsistency(ModelError),
    /// A search ceiling was exceeded; results would be incomplete, so the
    /// run fails fast instead of truncating silently.
    SearchBudgetExceeded(BudgetKind),
    /// An internal assumption was violated; this is an implementation bug,
    /// not a recoverable condition.
    BrokenInvariant(&'static str),
}

//! Explicit configuration threaded through every entry point.
//!
//! There is no process-wide state: the clone budget, the precision toggles,
//! and the search ceilings all travel in a [`CheckConfig`] value.

use std::time::Duration;

use typed_builder::TypedBuilder;

/// Hard ceilings on the exponential parts of the pipeline.
///
/// The DFS and the linear-extension enumeration are worst-case exponential;
/// exceeding any ceiling surfaces as
/// [`Error::SearchBudgetExceeded`](crate::error::Error::SearchBudgetExceeded)
/// rather than an unbounded run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct SearchCeiling {
    /// Longest DFS path the cycle enumerator may build.
    #[builder(default = 64)]
    pub max_path_len: usize,
    /// Most linear extensions the serialization derivation may enumerate.
    #[builder(default = 10_000)]
    pub max_serializations: usize,
    /// Wall-clock budget for the cycle search.
    #[builder(default = Duration::from_secs(30))]
    pub max_time: Duration,
}

impl Default for SearchCeiling {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration for one verification run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct CheckConfig {
    /// Maximum distinct concurrent-clone families allowed within one
    /// candidate cycle. The default of 0 disables clone traversal entirely.
    #[builder(default = 0)]
    pub clone_budget: usize,
    /// Enforce the future-order shape rule: revisits of the same
    /// transaction along a cycle must occur in non-decreasing label order.
    #[builder(default = true)]
    pub future_order_only: bool,
    /// When false, the oracle degrades to the coarse approximation: an
    /// edge exists iff two operations share a table and are not both
    /// reads, ignoring predicates and column footprints.
    #[builder(default = true)]
    pub predicate_precision: bool,
    /// When false, intra-transaction edges are unconditional `Sequence`
    /// edges between consecutive units instead of oracle-checked
    /// data-flow edges.
    #[builder(default = true)]
    pub data_dependencies: bool,
    #[builder(default)]
    pub ceiling: SearchCeiling,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = CheckConfig::default();
        assert_eq!(config.clone_budget, 0);
        assert!(config.future_order_only);
        assert!(config.predicate_precision);
        assert!(config.data_dependencies);
        assert_eq!(config.ceiling.max_path_len, 64);
    }

    #[test]
    fn builder_overrides() {
        let config = CheckConfig::builder()
            .clone_budget(1)
            .predicate_precision(false)
            .ceiling(SearchCeiling::builder().max_path_len(8).build())
            .build();
        assert_eq!(config.clone_budget, 1);
        assert!(!config.predicate_precision);
        assert_eq!(config.ceiling.max_path_len, 8);
    }
}

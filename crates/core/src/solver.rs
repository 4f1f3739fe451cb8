//! Satisfiability backend abstraction.
//!
//! The conflict oracle and the cycle validator both reduce to one
//! question: is a conjunction of [`Expr`] assertions satisfiable? The
//! answer is the tri-state [`SolverVerdict`]; `Unknown` (solver gave up,
//! timed out, or the input left the supported fragment) is a first-class
//! outcome and is never coerced into `Sat` or `Unsat` by this crate.
//!
//! The precise lazy-SMT implementation lives in the `sagacheck_smt`
//! crate; [`StructuralBackend`] here is the cheap conservative stand-in.

use crate::model::Expr;

/// Tri-state satisfiability verdict.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVerdict {
    Sat,
    Unsat,
    /// The solver could not decide within its budget, or the assertions
    /// fall outside its fragment. Distinct from both other verdicts.
    Unknown,
}

/// Decides satisfiability of a conjunction of assertions.
///
/// An empty slice is trivially satisfiable.
pub trait SatBackend {
    fn check_sat(&self, assertions: &[Expr]) -> SolverVerdict;
}

/// Structural approximation: satisfiable unless the conjunction simplifies
/// to a literal `false`.
///
/// Exact for predicate-free systems, where every assertion is the
/// unconstrained `true` placeholder. For systems with guards this
/// over-approximates (it may report `Sat` for a conjunction a real solver
/// would refute), which keeps anomaly detection conservative: no cycle is
/// discarded on the strength of an approximation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralBackend;

impl SatBackend for StructuralBackend {
    fn check_sat(&self, assertions: &[Expr]) -> SolverVerdict {
        let conjunction = Expr::And(assertions.to_vec()).simplify();
        if conjunction == Expr::Lit(false) {
            SolverVerdict::Unsat
        } else {
            SolverVerdict::Sat
        }
    }
}

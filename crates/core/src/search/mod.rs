//! Cycle search over the conflict graph: bounded DFS enumeration,
//! shape + satisfiability validation, and per-cycle serialization
//! derivation.

pub mod enumerate;
pub mod serialize;
pub mod validate;

pub use enumerate::{find_cycles, CycleFindings, CycleRecord};
pub use serialize::{derive_serializations, SerializationReport};
pub use validate::CycleVerdict;

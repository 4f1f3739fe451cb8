pub mod conflict;
pub mod digraph;

pub use conflict::{ConflictGraph, EdgeKind, NodeMeta};
pub use digraph::{DiGraph, TopoSortError};

//! The conflict graph: units as nodes, possible ordering dependencies as
//! undirected labelled edges.
//!
//! Nodes are [`UnitLabel`]s, identity keys, so cloned units stay distinct
//! from their originals. Every edge is mirrored symmetrically and carries
//! a label plus the assertion set under which the conflict is realizable
//! (stored under both key orderings). Business sequences record each
//! transaction's unit order; the cycle machinery uses them to decide what
//! follows what and to detect same-owner revisits.

use hashbrown::{HashMap, HashSet};

use crate::model::{Expr, UnitLabel};

/// What kind of dependency an edge witnesses.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Coarse mode: two writes to the same table.
    WriteWrite,
    /// Coarse mode: a read and a write of the same table.
    ReadWrite,
    /// Precise mode: a solver-confirmed table or variable-flow conflict.
    Predicate,
    /// Intra-transaction output-to-input data flow.
    DataFlow,
    /// Unconditional consecutive-unit edge (data dependencies disabled).
    Sequence,
    /// The solver could not decide; the edge is kept conservatively.
    Unknown,
}

/// Node metadata needed by the shape-validation rules.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    /// Name of the owning business transaction. Clone siblings carry the
    /// synthesized `#clone` name, so grouping by owner separates them
    /// from their originals.
    pub owner: String,
    pub cloned: bool,
}

/// Undirected conflict graph over flattened units.
///
/// Built once from the final flattened system; immutable afterwards.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone)]
pub struct ConflictGraph {
    adj: HashMap<UnitLabel, HashSet<(UnitLabel, EdgeKind)>>,
    assertions: HashMap<(UnitLabel, UnitLabel), Vec<Expr>>,
    sequences: Vec<Vec<UnitLabel>>,
    seq_index: HashMap<UnitLabel, usize>,
    meta: HashMap<UnitLabel, NodeMeta>,
}

impl ConflictGraph {
    /// Adds a node with its metadata. Idempotent; the first metadata wins.
    pub fn add_node(&mut self, node: UnitLabel, meta: NodeMeta) {
        self.adj.entry(node).or_default();
        self.meta.entry(node).or_insert(meta);
    }

    /// Adds a symmetric edge. The assertion set is stored under both key
    /// orderings. Nodes must already exist (the builder registers every
    /// unit before wiring edges).
    pub fn add_edge(
        &mut self,
        a: UnitLabel,
        b: UnitLabel,
        kind: EdgeKind,
        assertions: Vec<Expr>,
    ) {
        self.adj.entry(a).or_default().insert((b, kind));
        self.adj.entry(b).or_default().insert((a, kind));
        self.assertions.insert((a, b), assertions.clone());
        self.assertions.insert((b, a), assertions);
    }

    /// Removes every edge between `a` and `b`, in both directions.
    pub fn remove_edge(&mut self, a: UnitLabel, b: UnitLabel) {
        if let Some(neighbors) = self.adj.get_mut(&a) {
            neighbors.retain(|(n, _)| *n != b);
        }
        if let Some(neighbors) = self.adj.get_mut(&b) {
            neighbors.retain(|(n, _)| *n != a);
        }
        self.assertions.remove(&(a, b));
        self.assertions.remove(&(b, a));
    }

    #[must_use]
    pub fn has_edge(&self, a: UnitLabel, b: UnitLabel) -> bool {
        self.adj
            .get(&a)
            .is_some_and(|neighbors| neighbors.iter().any(|(n, _)| *n == b))
    }

    /// Neighbours of `node` with the label of the connecting edge.
    #[must_use]
    pub fn neighbours(&self, node: UnitLabel) -> Vec<(UnitLabel, EdgeKind)> {
        self.adj
            .get(&node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Assertion set stored for the edge between `a` and `b`.
    #[must_use]
    pub fn assertions(&self, a: UnitLabel, b: UnitLabel) -> &[Expr] {
        self.assertions
            .get(&(a, b))
            .map_or(&[], |exprs| exprs.as_slice())
    }

    /// Records one transaction's ordered unit list.
    pub fn add_business_sequence(&mut self, nodes: Vec<UnitLabel>) {
        let index = self.sequences.len();
        for &n in &nodes {
            self.seq_index.insert(n, index);
        }
        self.sequences.push(nodes);
    }

    /// The business sequence containing `node`, if any.
    #[must_use]
    pub fn sequence_of(&self, node: UnitLabel) -> Option<&[UnitLabel]> {
        self.seq_index
            .get(&node)
            .map(|&i| self.sequences[i].as_slice())
    }

    /// Index of the business sequence containing `node`.
    #[must_use]
    pub fn sequence_index_of(&self, node: UnitLabel) -> Option<usize> {
        self.seq_index.get(&node).copied()
    }

    /// All business sequences, in registration order.
    #[must_use]
    pub fn business_sequences(&self) -> &[Vec<UnitLabel>] {
        &self.sequences
    }

    #[must_use]
    pub fn meta(&self, node: UnitLabel) -> Option<&NodeMeta> {
        self.meta.get(&node)
    }

    /// All nodes, unordered.
    pub fn nodes(&self) -> impl Iterator<Item = UnitLabel> + '_ {
        self.adj.keys().copied()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adj.values().map(HashSet::len).sum::<usize>() / 2
    }

    /// Canonical view for determinism checks: sorted nodes and sorted
    /// undirected edges.
    #[must_use]
    pub fn canonical_sets(&self) -> (Vec<UnitLabel>, Vec<(UnitLabel, UnitLabel, EdgeKind)>) {
        let mut nodes: Vec<UnitLabel> = self.adj.keys().copied().collect();
        nodes.sort_unstable();
        let mut edges: Vec<(UnitLabel, UnitLabel, EdgeKind)> = self
            .adj
            .iter()
            .flat_map(|(&a, neighbors)| {
                neighbors
                    .iter()
                    .filter(move |(b, _)| a <= *b)
                    .map(move |&(b, kind)| (a, b, kind))
            })
            .collect();
        edges.sort_unstable_by_key(|&(a, b, _)| (a, b));
        (nodes, edges)
    }
}

use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

/// Why [`DiGraph::all_topological_sorts`] could not produce a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoSortError {
    /// The graph contains a cycle; no linear extension exists.
    Cyclic,
    /// More linear extensions exist than the caller's limit.
    LimitExceeded,
}

/// Directed graph backed by an adjacency map.
///
/// Vertices are added implicitly when they appear in an edge. Equality
/// compares vertex and edge sets, which is how dependency DAGs are
/// deduplicated across cycles.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Maps each vertex to the set of vertices it has edges to.
    pub adj_map: HashMap<T, HashSet<T>>,
}

impl<T> DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Inserts a directed edge from `source` to `target`.
    ///
    /// Both vertices are added to the graph if not already present.
    pub fn add_edge(&mut self, source: T, target: T) {
        self.adj_map
            .entry(source)
            .or_default()
            .insert(target.clone());
        self.adj_map.entry(target).or_default();
    }

    /// Returns `true` if `vertex` is present.
    pub fn has_vertex(&self, vertex: &T) -> bool {
        self.adj_map.contains_key(vertex)
    }

    /// Returns `true` if an edge from `source` to `target` exists.
    pub fn has_edge(&self, source: &T, target: &T) -> bool {
        self.adj_map
            .get(source)
            .is_some_and(|neighbors| neighbors.contains(target))
    }

    /// Returns `true` if `target` is reachable from `source` along
    /// directed edges. A vertex reaches itself.
    pub fn has_path(&self, source: &T, target: &T) -> bool {
        if !self.has_vertex(source) || !self.has_vertex(target) {
            return false;
        }
        if source == target {
            return true;
        }
        let mut visited: HashSet<&T> = HashSet::new();
        let mut stack: Vec<&T> = vec![source];
        while let Some(v) = stack.pop() {
            if let Some(neighbors) = self.adj_map.get(v) {
                for n in neighbors {
                    if n == target {
                        return true;
                    }
                    if visited.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
        false
    }

    /// Returns a valid topological ordering if the graph is acyclic, or
    /// `None` if it contains a cycle. Kahn's algorithm, O(V+E).
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<T>> {
        let mut in_degree = self.in_degrees();

        let mut queue: Vec<T> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(vertex, _)| vertex.clone())
            .collect();

        let mut result = Vec::new();
        while let Some(vertex) = queue.pop() {
            result.push(vertex.clone());
            if let Some(neighbors) = self.adj_map.get(&vertex) {
                for neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(neighbor.clone());
                        }
                    }
                }
            }
        }

        (result.len() == self.adj_map.len()).then_some(result)
    }

    /// Returns `true` if the graph has no cycles.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.topological_sort().is_some()
    }

    /// Enumerates every topological ordering (all linear extensions).
    ///
    /// # Errors
    ///
    /// [`TopoSortError::Cyclic`] if the graph has no linear extension at
    /// all; [`TopoSortError::LimitExceeded`] once more than `limit`
    /// orderings have been produced.
    pub fn all_topological_sorts(&self, limit: usize) -> Result<Vec<Vec<T>>, TopoSortError> {
        let mut in_degree = self.in_degrees();
        let mut prefix: Vec<T> = Vec::with_capacity(self.adj_map.len());
        let mut sorts: Vec<Vec<T>> = Vec::new();
        self.extend_sorts(&mut in_degree, &mut prefix, &mut sorts, limit)?;
        if sorts.is_empty() && !self.adj_map.is_empty() {
            return Err(TopoSortError::Cyclic);
        }
        Ok(sorts)
    }

    fn in_degrees(&self) -> HashMap<T, usize> {
        let mut in_degree: HashMap<T, usize> = HashMap::new();
        for vertex in self.adj_map.keys() {
            in_degree.entry(vertex.clone()).or_insert(0);
        }
        for neighbors in self.adj_map.values() {
            for neighbor in neighbors {
                *in_degree.entry(neighbor.clone()).or_insert(0) += 1;
            }
        }
        in_degree
    }

    /// Backtracking enumeration: try each currently-free vertex, recurse,
    /// restore. `usize::MAX` in the degree map marks placed vertices.
    fn extend_sorts(
        &self,
        in_degree: &mut HashMap<T, usize>,
        prefix: &mut Vec<T>,
        sorts: &mut Vec<Vec<T>>,
        limit: usize,
    ) -> Result<(), TopoSortError> {
        if prefix.len() == self.adj_map.len() {
            if sorts.len() >= limit {
                return Err(TopoSortError::LimitExceeded);
            }
            sorts.push(prefix.clone());
            return Ok(());
        }

        let free: Vec<T> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(v, _)| v.clone())
            .collect();

        for vertex in free {
            in_degree.insert(vertex.clone(), usize::MAX);
            if let Some(neighbors) = self.adj_map.get(&vertex) {
                for n in neighbors {
                    if let Some(d) = in_degree.get_mut(n) {
                        if *d != usize::MAX {
                            *d -= 1;
                        }
                    }
                }
            }
            prefix.push(vertex.clone());

            self.extend_sorts(in_degree, prefix, sorts, limit)?;

            prefix.pop();
            if let Some(neighbors) = self.adj_map.get(&vertex) {
                for n in neighbors {
                    if let Some(d) = in_degree.get_mut(n) {
                        if *d != usize::MAX {
                            *d += 1;
                        }
                    }
                }
            }
            in_degree.insert(vertex, 0);
        }
        Ok(())
    }
}

//! Theory solvers for the conjunctive fragment: integer difference logic
//! and string equality.

use std::collections::HashMap;

/// One side of an integer difference constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IntOperand {
    Var(String),
    Const(i64),
}

/// `lhs <= rhs` (`strict` makes it `<`). Constant-only constraints are
/// folded away before reaching the theory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IntAtom {
    pub lhs: IntOperand,
    pub rhs: IntOperand,
    pub strict: bool,
}

/// Consistency of a conjunction of difference constraints.
///
/// Every constraint becomes an edge of a weighted graph over the
/// variables plus a zero vertex anchoring constants; the conjunction is
/// inconsistent iff the graph has a negative cycle (Bellman-Ford).
pub(crate) fn ints_consistent(atoms: &[IntAtom]) -> bool {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut count = 1; // vertex 0 is the zero anchor

    // edges (from, to, weight) meaning to - from <= weight
    let mut edges: Vec<(usize, usize, i64)> = Vec::new();
    for atom in atoms {
        let offset = i64::from(atom.strict);
        match (&atom.lhs, &atom.rhs) {
            // x <= y (+ strict): x - y <= -offset, edge y -> x
            (IntOperand::Var(x), IntOperand::Var(y)) => {
                let xi = intern(&mut index, &mut count, x);
                let yi = intern(&mut index, &mut count, y);
                edges.push((yi, xi, -offset));
            }
            // x <= c: edge zero -> x with weight c (- offset)
            (IntOperand::Var(x), IntOperand::Const(c)) => {
                let xi = intern(&mut index, &mut count, x);
                edges.push((0, xi, c - offset));
            }
            // c <= x: x - zero >= c, so zero - x <= -c (- offset)
            (IntOperand::Const(c), IntOperand::Var(x)) => {
                let xi = intern(&mut index, &mut count, x);
                edges.push((xi, 0, -c - offset));
            }
            (IntOperand::Const(a), IntOperand::Const(b)) => {
                // normally folded before reaching the theory
                let holds = if atom.strict { a < b } else { a <= b };
                if !holds {
                    return false;
                }
            }
        }
    }

    // Bellman-Ford with all distances seeded to zero (implicit super
    // source), |V| - 1 rounds, then one extra round for cycle detection.
    let mut dist = vec![0i64; count];
    for _ in 1..count {
        let mut changed = false;
        for &(from, to, w) in &edges {
            if dist[from] + w < dist[to] {
                dist[to] = dist[from] + w;
                changed = true;
            }
        }
        if !changed {
            return true;
        }
    }
    edges
        .iter()
        .all(|&(from, to, w)| dist[from] + w >= dist[to])
}

fn intern<'a>(index: &mut HashMap<&'a str, usize>, count: &mut usize, name: &'a str) -> usize {
    if let Some(&i) = index.get(name) {
        return i;
    }
    let i = *count;
    index.insert(name, i);
    *count += 1;
    i
}

/// One side of a string (dis)equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum StrOperand {
    Var(String),
    Const(String),
}

/// `lhs = rhs` when `equal`, `lhs != rhs` otherwise. Operands are kept
/// sorted so symmetric atoms share one SAT variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StrAtom {
    pub lhs: StrOperand,
    pub rhs: StrOperand,
    pub equal: bool,
}

impl StrAtom {
    pub fn new(a: StrOperand, b: StrOperand, equal: bool) -> Self {
        let (lhs, rhs) = if a <= b { (a, b) } else { (b, a) };
        Self { lhs, rhs, equal }
    }
}

/// Consistency of a conjunction of string (dis)equalities: union-find
/// over the equalities, then every class must hold at most one distinct
/// constant and no disequality may connect a class to itself.
pub(crate) fn strings_consistent(atoms: &[StrAtom]) -> bool {
    let mut index: HashMap<&StrOperand, usize> = HashMap::new();
    let mut uf = UnionFind::default();

    fn idx<'a>(
        op: &'a StrOperand,
        index: &mut HashMap<&'a StrOperand, usize>,
        uf: &mut UnionFind,
    ) -> usize {
        *index.entry(op).or_insert_with(|| uf.push())
    }

    for atom in atoms.iter().filter(|a| a.equal) {
        let l = idx(&atom.lhs, &mut index, &mut uf);
        let r = idx(&atom.rhs, &mut index, &mut uf);
        uf.union(l, r);
    }

    // at most one constant per class
    let mut class_const: HashMap<usize, &str> = HashMap::new();
    for (op, &i) in &index {
        if let StrOperand::Const(c) = op {
            let root = uf.find(i);
            if let Some(&existing) = class_const.get(&root) {
                if existing != c.as_str() {
                    return false;
                }
            }
            class_const.insert(root, c.as_str());
        }
    }

    for atom in atoms.iter().filter(|a| !a.equal) {
        match (&atom.lhs, &atom.rhs) {
            (StrOperand::Const(a), StrOperand::Const(b)) if a == b => return false,
            _ => {}
        }
        let l = idx(&atom.lhs, &mut index, &mut uf);
        let r = idx(&atom.rhs, &mut index, &mut uf);
        if uf.find(l) == uf.find(r) {
            return false;
        }
    }
    true
}

#[derive(Default)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn push(&mut self) -> usize {
        let i = self.parent.len();
        self.parent.push(i);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

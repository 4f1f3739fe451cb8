//! Lazy SMT backend for the conflict oracle.
//!
//! [`LazySolver`] decides edge and cycle assertions precisely where
//! [`StructuralBackend`](sagacheck_core::StructuralBackend) only
//! approximates. It runs the classic lazy loop: the boolean skeleton of
//! the conjunction goes to a SAT solver, each satisfying assignment is
//! projected onto its theory atoms and checked for theory consistency,
//! and every theory conflict comes back as a blocking clause until the
//! skeleton is exhausted or a theory-consistent model survives.
//!
//! The supported fragment is what bound guard predicates produce:
//! integer difference constraints (decided by negative-cycle detection),
//! string (dis)equalities (decided by union-find), and boolean
//! equations. Anything outside it, an ordering on strings, a comparison
//! across sorts, yields [`SolverVerdict::Unknown`] rather than a guess.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Lit, TernaryVal};
use rustsat_batsat::BasicSolver;

use sagacheck_core::model::{CmpOp, Expr, Operand, Value, VarSort};
use sagacheck_core::solver::{SatBackend, SolverVerdict};

use crate::theory::{IntAtom, IntOperand, StrAtom, StrOperand};

mod theory;

/// SAT-guided solver with refinement against the two theories.
///
/// Stateless across calls; every [`check_sat`](SatBackend::check_sat)
/// builds a fresh solver instance.
#[derive(Debug, Clone)]
pub struct LazySolver {
    /// Wall-clock budget for one query. `None` disables the check.
    pub timeout: Option<Duration>,
    /// Upper bound on refinement rounds before giving up with `Unknown`.
    pub max_refinements: usize,
}

impl Default for LazySolver {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            max_refinements: 10_000,
        }
    }
}

impl SatBackend for LazySolver {
    fn check_sat(&self, assertions: &[Expr]) -> SolverVerdict {
        let started = Instant::now();
        let conjunction = Expr::And(assertions.to_vec()).simplify();

        let mut normalizer = Normalizer::default();
        let Ok(root) = normalizer.normalize(&conjunction, true) else {
            return SolverVerdict::Unknown;
        };
        match root {
            Node::True => return SolverVerdict::Sat,
            Node::False => return SolverVerdict::Unsat,
            _ => {}
        }

        let mut encoder = Encoder {
            solver: BasicSolver::default(),
            next_var: normalizer.next_var,
        };
        let root_lit = encoder.encode(&root);
        encoder
            .solver
            .add_clause(std::iter::once(root_lit).collect())
            .unwrap();

        for _ in 0..self.max_refinements {
            if self.timeout.is_some_and(|budget| started.elapsed() > budget) {
                return SolverVerdict::Unknown;
            }
            match encoder.solver.solve() {
                Ok(SolverResult::Sat) => {}
                Ok(SolverResult::Unsat) => return SolverVerdict::Unsat,
                Ok(SolverResult::Interrupted) | Err(_) => return SolverVerdict::Unknown,
            }

            let mut int_atoms = Vec::new();
            let mut int_vars = Vec::new();
            for (atom, &var) in &normalizer.int_atoms {
                if assigned_true(&encoder.solver, var) {
                    int_atoms.push(atom.clone());
                    int_vars.push(var);
                }
            }
            let mut str_atoms = Vec::new();
            let mut str_vars = Vec::new();
            for (atom, &var) in &normalizer.str_atoms {
                if assigned_true(&encoder.solver, var) {
                    str_atoms.push(atom.clone());
                    str_vars.push(var);
                }
            }

            let blocked = if theory::ints_consistent(&int_atoms) {
                if theory::strings_consistent(&str_atoms) {
                    return SolverVerdict::Sat;
                }
                str_vars
            } else {
                int_vars
            };
            if blocked.is_empty() {
                // an empty atom set cannot be inconsistent; nothing left
                // to refine against
                return SolverVerdict::Unsat;
            }
            encoder
                .solver
                .add_clause(blocked.into_iter().map(Lit::negative).collect())
                .unwrap();
        }
        SolverVerdict::Unknown
    }
}

fn assigned_true(solver: &BasicSolver, var: u32) -> bool {
    matches!(solver.lit_val(Lit::positive(var)), Ok(TernaryVal::True))
}

/// Boolean skeleton node. Theory atoms and boolean variables have been
/// replaced by SAT variables; negation survives only on leaves, the
/// normalizer pushes it through connectives and compiles it away on
/// comparisons.
#[derive(Debug, Clone)]
enum Node {
    True,
    False,
    Pos(u32),
    Neg(u32),
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Node {
    const fn from_bool(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

fn conjoin(children: Vec<Node>) -> Node {
    let mut out = Vec::new();
    for child in children {
        match child {
            Node::True => {}
            Node::False => return Node::False,
            other => out.push(other),
        }
    }
    match out.len() {
        0 => Node::True,
        1 => out.pop().unwrap_or(Node::True),
        _ => Node::And(out),
    }
}

fn disjoin(children: Vec<Node>) -> Node {
    let mut out = Vec::new();
    for child in children {
        match child {
            Node::False => {}
            Node::True => return Node::True,
            other => out.push(other),
        }
    }
    match out.len() {
        0 => Node::False,
        1 => out.pop().unwrap_or(Node::False),
        _ => Node::Or(out),
    }
}

/// The input mixes sorts or uses an operator the fragment has no
/// decision procedure for.
struct OutOfFragment;

/// Rewrites an [`Expr`] into a [`Node`] skeleton while interning theory
/// atoms and boolean variables as SAT variables.
///
/// Integer comparisons are canonicalized to non-strict/strict `<=`
/// atoms: equality splits into two bounds, disequality into a strict
/// disjunction, and negation flips into the complementary operator, so
/// every surviving atom occurs positively.
#[derive(Debug, Default)]
struct Normalizer {
    next_var: u32,
    bool_vars: HashMap<String, u32>,
    int_atoms: HashMap<IntAtom, u32>,
    str_atoms: HashMap<StrAtom, u32>,
}

impl Normalizer {
    fn fresh(&mut self) -> u32 {
        let var = self.next_var;
        self.next_var += 1;
        var
    }

    fn normalize(&mut self, expr: &Expr, polarity: bool) -> Result<Node, OutOfFragment> {
        match expr {
            Expr::Lit(b) => Ok(Node::from_bool(*b == polarity)),
            Expr::Not(inner) => self.normalize(inner, !polarity),
            Expr::And(es) => {
                let children = es
                    .iter()
                    .map(|e| self.normalize(e, polarity))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if polarity {
                    conjoin(children)
                } else {
                    disjoin(children)
                })
            }
            Expr::Or(es) => {
                let children = es
                    .iter()
                    .map(|e| self.normalize(e, polarity))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if polarity {
                    disjoin(children)
                } else {
                    conjoin(children)
                })
            }
            Expr::Cmp { op, lhs, rhs } => {
                let op = if polarity { *op } else { complement(*op) };
                self.normalize_cmp(op, lhs, rhs)
            }
        }
    }

    fn normalize_cmp(
        &mut self,
        op: CmpOp,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<Node, OutOfFragment> {
        let sort = operand_sort(lhs);
        if operand_sort(rhs) != sort {
            return Err(OutOfFragment);
        }
        match sort {
            VarSort::Int => {
                let l = int_operand(lhs)?;
                let r = int_operand(rhs)?;
                Ok(match op {
                    CmpOp::Le => self.int_atom(l, r, false),
                    CmpOp::Lt => self.int_atom(l, r, true),
                    CmpOp::Ge => self.int_atom(r, l, false),
                    CmpOp::Gt => self.int_atom(r, l, true),
                    CmpOp::Eq => conjoin(vec![
                        self.int_atom(l.clone(), r.clone(), false),
                        self.int_atom(r, l, false),
                    ]),
                    CmpOp::Ne => disjoin(vec![
                        self.int_atom(l.clone(), r.clone(), true),
                        self.int_atom(r, l, true),
                    ]),
                })
            }
            VarSort::Str => {
                let l = str_operand(lhs)?;
                let r = str_operand(rhs)?;
                match op {
                    CmpOp::Eq => Ok(self.str_atom(l, r, true)),
                    CmpOp::Ne => Ok(self.str_atom(l, r, false)),
                    // no order on strings in this fragment
                    _ => Err(OutOfFragment),
                }
            }
            VarSort::Bool => {
                let l = self.bool_leaf(lhs)?;
                let r = self.bool_leaf(rhs)?;
                match op {
                    CmpOp::Eq => Ok(bool_cmp(l, r, true)),
                    CmpOp::Ne => Ok(bool_cmp(l, r, false)),
                    _ => Err(OutOfFragment),
                }
            }
        }
    }

    /// `lhs <= rhs` (or `<` when strict) as an interned positive atom;
    /// constant comparisons fold immediately.
    fn int_atom(&mut self, lhs: IntOperand, rhs: IntOperand, strict: bool) -> Node {
        if let (IntOperand::Const(a), IntOperand::Const(b)) = (&lhs, &rhs) {
            return Node::from_bool(if strict { a < b } else { a <= b });
        }
        let atom = IntAtom { lhs, rhs, strict };
        if let Some(&var) = self.int_atoms.get(&atom) {
            return Node::Pos(var);
        }
        let var = self.fresh();
        self.int_atoms.insert(atom, var);
        Node::Pos(var)
    }

    fn str_atom(&mut self, lhs: StrOperand, rhs: StrOperand, equal: bool) -> Node {
        if let (StrOperand::Const(a), StrOperand::Const(b)) = (&lhs, &rhs) {
            return Node::from_bool((a == b) == equal);
        }
        let atom = StrAtom::new(lhs, rhs, equal);
        if let Some(&var) = self.str_atoms.get(&atom) {
            return Node::Pos(var);
        }
        let var = self.fresh();
        self.str_atoms.insert(atom, var);
        Node::Pos(var)
    }

    fn bool_leaf(&mut self, operand: &Operand) -> Result<BoolLeaf, OutOfFragment> {
        match operand {
            Operand::Var(v) => {
                if let Some(&var) = self.bool_vars.get(&v.name) {
                    return Ok(BoolLeaf::Var(var));
                }
                let var = self.fresh();
                self.bool_vars.insert(v.name.clone(), var);
                Ok(BoolLeaf::Var(var))
            }
            Operand::Lit(Value::Bool(b)) => Ok(BoolLeaf::Const(*b)),
            Operand::Lit(_) => Err(OutOfFragment),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BoolLeaf {
    Const(bool),
    Var(u32),
}

/// Boolean (dis)equation, compiled propositionally.
fn bool_cmp(lhs: BoolLeaf, rhs: BoolLeaf, equal: bool) -> Node {
    match (lhs, rhs) {
        (BoolLeaf::Const(a), BoolLeaf::Const(b)) => Node::from_bool((a == b) == equal),
        (BoolLeaf::Const(c), BoolLeaf::Var(v)) | (BoolLeaf::Var(v), BoolLeaf::Const(c)) => {
            if c == equal {
                Node::Pos(v)
            } else {
                Node::Neg(v)
            }
        }
        (BoolLeaf::Var(p), BoolLeaf::Var(q)) => {
            if equal {
                Node::And(vec![
                    Node::Or(vec![Node::Neg(p), Node::Pos(q)]),
                    Node::Or(vec![Node::Pos(p), Node::Neg(q)]),
                ])
            } else {
                Node::And(vec![
                    Node::Or(vec![Node::Pos(p), Node::Pos(q)]),
                    Node::Or(vec![Node::Neg(p), Node::Neg(q)]),
                ])
            }
        }
    }
}

const fn complement(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Eq => CmpOp::Ne,
        CmpOp::Ne => CmpOp::Eq,
        CmpOp::Lt => CmpOp::Ge,
        CmpOp::Le => CmpOp::Gt,
        CmpOp::Gt => CmpOp::Le,
        CmpOp::Ge => CmpOp::Lt,
    }
}

const fn operand_sort(operand: &Operand) -> VarSort {
    match operand {
        Operand::Var(v) => v.sort,
        Operand::Lit(v) => v.sort(),
    }
}

fn int_operand(operand: &Operand) -> Result<IntOperand, OutOfFragment> {
    match operand {
        Operand::Var(v) => Ok(IntOperand::Var(v.name.clone())),
        Operand::Lit(Value::Int(i)) => Ok(IntOperand::Const(*i)),
        Operand::Lit(_) => Err(OutOfFragment),
    }
}

fn str_operand(operand: &Operand) -> Result<StrOperand, OutOfFragment> {
    match operand {
        Operand::Var(v) => Ok(StrOperand::Var(v.name.clone())),
        Operand::Lit(Value::Str(s)) => Ok(StrOperand::Const(s.clone())),
        Operand::Lit(_) => Err(OutOfFragment),
    }
}

/// Plaisted-Greenbaum encoding of the skeleton into the SAT solver.
///
/// Every node occurs positively under the asserted root, so one
/// implication direction per connective suffices.
struct Encoder {
    solver: BasicSolver,
    next_var: u32,
}

impl Encoder {
    fn fresh(&mut self) -> u32 {
        let var = self.next_var;
        self.next_var += 1;
        var
    }

    fn encode(&mut self, node: &Node) -> Lit {
        match node {
            Node::Pos(v) => Lit::positive(*v),
            Node::Neg(v) => Lit::negative(*v),
            Node::True => {
                let v = self.fresh();
                self.solver
                    .add_clause(std::iter::once(Lit::positive(v)).collect())
                    .unwrap();
                Lit::positive(v)
            }
            Node::False => {
                let v = self.fresh();
                self.solver
                    .add_clause(std::iter::once(Lit::negative(v)).collect())
                    .unwrap();
                Lit::positive(v)
            }
            Node::And(children) => {
                let v = self.fresh();
                for child in children {
                    let c = self.encode(child);
                    self.solver
                        .add_clause([Lit::negative(v), c].into_iter().collect())
                        .unwrap();
                }
                Lit::positive(v)
            }
            Node::Or(children) => {
                let v = self.fresh();
                let mut clause = vec![Lit::negative(v)];
                for child in children {
                    clause.push(self.encode(child));
                }
                self.solver
                    .add_clause(clause.into_iter().collect())
                    .unwrap();
                Lit::positive(v)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagacheck_core::model::SmtVar;

    fn ivar(name: &str) -> Operand {
        Operand::Var(SmtVar::new(name, VarSort::Int))
    }

    fn svar(name: &str) -> Operand {
        Operand::Var(SmtVar::new(name, VarSort::Str))
    }

    fn bvar(name: &str) -> Operand {
        Operand::Var(SmtVar::new(name, VarSort::Bool))
    }

    fn int(v: i64) -> Operand {
        Operand::Lit(Value::Int(v))
    }

    fn text(v: &str) -> Operand {
        Operand::Lit(Value::Str(v.into()))
    }

    fn cmp(op: CmpOp, lhs: Operand, rhs: Operand) -> Expr {
        Expr::Cmp { op, lhs, rhs }
    }

    fn solve(assertions: &[Expr]) -> SolverVerdict {
        LazySolver::default().check_sat(assertions)
    }

    #[test]
    fn empty_conjunction_is_sat() {
        assert_eq!(solve(&[]), SolverVerdict::Sat);
    }

    #[test]
    fn bounded_interval_is_sat() {
        let assertions = [
            cmp(CmpOp::Gt, ivar("x"), int(0)),
            cmp(CmpOp::Lt, ivar("x"), int(10)),
        ];
        assert_eq!(solve(&assertions), SolverVerdict::Sat);
    }

    #[test]
    fn empty_interval_is_unsat() {
        let assertions = [
            cmp(CmpOp::Gt, ivar("x"), int(0)),
            cmp(CmpOp::Lt, ivar("x"), int(0)),
        ];
        assert_eq!(solve(&assertions), SolverVerdict::Unsat);
    }

    #[test]
    fn equality_pins_a_point() {
        let pinned = [
            cmp(CmpOp::Ge, ivar("x"), int(5)),
            cmp(CmpOp::Le, ivar("x"), int(5)),
            cmp(CmpOp::Eq, ivar("x"), int(5)),
        ];
        assert_eq!(solve(&pinned), SolverVerdict::Sat);

        let crossed = [
            cmp(CmpOp::Ge, ivar("x"), int(6)),
            cmp(CmpOp::Le, ivar("x"), int(5)),
        ];
        assert_eq!(solve(&crossed), SolverVerdict::Unsat);
    }

    #[test]
    fn self_disequality_is_unsat() {
        let assertions = [cmp(CmpOp::Ne, ivar("x"), ivar("x"))];
        assert_eq!(solve(&assertions), SolverVerdict::Unsat);
    }

    #[test]
    fn negated_bound_flips_the_operator() {
        let assertions = [
            Expr::Not(Box::new(cmp(CmpOp::Le, ivar("x"), int(5)))),
            cmp(CmpOp::Le, ivar("x"), int(5)),
        ];
        assert_eq!(solve(&assertions), SolverVerdict::Unsat);
    }

    #[test]
    fn disjunctive_guard_refines_until_the_skeleton_is_exhausted() {
        let outside = Expr::Or(vec![
            cmp(CmpOp::Lt, ivar("x"), int(0)),
            cmp(CmpOp::Gt, ivar("x"), int(10)),
        ]);
        assert_eq!(
            solve(&[outside.clone(), cmp(CmpOp::Eq, ivar("x"), int(5))]),
            SolverVerdict::Unsat
        );
        assert_eq!(
            solve(&[outside, cmp(CmpOp::Eq, ivar("x"), int(20))]),
            SolverVerdict::Sat
        );
    }

    #[test]
    fn string_equalities_propagate_transitively() {
        let assertions = [
            cmp(CmpOp::Eq, svar("a"), svar("b")),
            cmp(CmpOp::Eq, svar("b"), svar("c")),
            cmp(CmpOp::Ne, svar("a"), svar("c")),
        ];
        assert_eq!(solve(&assertions), SolverVerdict::Unsat);
    }

    #[test]
    fn distinct_string_constants_conflict() {
        let merged = [
            cmp(CmpOp::Eq, svar("a"), text("eu")),
            cmp(CmpOp::Eq, svar("a"), text("us")),
        ];
        assert_eq!(solve(&merged), SolverVerdict::Unsat);

        let apart = [
            cmp(CmpOp::Eq, svar("a"), text("eu")),
            cmp(CmpOp::Eq, svar("b"), text("us")),
            cmp(CmpOp::Ne, svar("a"), svar("b")),
        ];
        assert_eq!(solve(&apart), SolverVerdict::Sat);
    }

    #[test]
    fn ordering_on_strings_is_unknown() {
        let assertions = [cmp(CmpOp::Lt, svar("a"), text("zz"))];
        assert_eq!(solve(&assertions), SolverVerdict::Unknown);
    }

    #[test]
    fn mixed_sorts_are_unknown() {
        let assertions = [cmp(CmpOp::Eq, ivar("x"), text("five"))];
        assert_eq!(solve(&assertions), SolverVerdict::Unknown);
    }

    #[test]
    fn boolean_equations_are_propositional() {
        let contradictory = [
            cmp(CmpOp::Eq, bvar("p"), Operand::Lit(Value::Bool(true))),
            cmp(CmpOp::Eq, bvar("p"), Operand::Lit(Value::Bool(false))),
        ];
        assert_eq!(solve(&contradictory), SolverVerdict::Unsat);

        let xor = [cmp(CmpOp::Ne, bvar("p"), bvar("q"))];
        assert_eq!(solve(&xor), SolverVerdict::Sat);
    }

    #[test]
    fn zero_timeout_reports_unknown() {
        let solver = LazySolver {
            timeout: Some(Duration::ZERO),
            max_refinements: 10,
        };
        let assertions = [cmp(CmpOp::Gt, ivar("x"), int(0))];
        assert_eq!(solver.check_sat(&assertions), SolverVerdict::Unknown);
    }

    #[test]
    fn exhausted_refinement_budget_reports_unknown() {
        let solver = LazySolver {
            timeout: None,
            max_refinements: 0,
        };
        let assertions = [cmp(CmpOp::Gt, ivar("x"), int(0))];
        assert_eq!(solver.check_sat(&assertions), SolverVerdict::Unknown);
    }
}

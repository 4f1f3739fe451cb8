//! Guard predicates and solver-level expressions.
//!
//! An [`Operation`](super::Operation) may carry a [`Predicate`]: a small
//! expression tree over the *names* of parameters visible at the call site.
//! Predicates stay inspectable and serializable; they only become solver
//! material when [`Predicate::bind`] resolves every name against a
//! [`VarCtx`] (the per-unit variable context built by the conflict oracle),
//! producing an [`Expr`] over scoped [`SmtVar`]s.
//!
//! Scoping is what keeps identical parameter names in different units from
//! aliasing: an `SmtVar`'s name embeds the owning transaction, unit label,
//! or producing operation (see the oracle's context construction).

use hashbrown::{HashMap, HashSet};

use crate::error::ModelError;

/// Semantic sort of a column, parameter, or solver variable.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarSort {
    Int,
    Str,
    Bool,
}

/// A constant of one of the three supported sorts.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    #[must_use]
    pub const fn sort(&self) -> VarSort {
        match self {
            Self::Int(_) => VarSort::Int,
            Self::Str(_) => VarSort::Str,
            Self::Bool(_) => VarSort::Bool,
        }
    }
}

/// Comparison operator between two terms.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Predicate-level operand: a named parameter or a literal.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Param(String),
    Lit(Value),
}

impl Term {
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    #[must_use]
    pub const fn int(v: i64) -> Self {
        Self::Lit(Value::Int(v))
    }

    pub fn str(v: impl Into<String>) -> Self {
        Self::Lit(Value::Str(v.into()))
    }

    #[must_use]
    pub const fn bool(v: bool) -> Self {
        Self::Lit(Value::Bool(v))
    }
}

/// Guard predicate over parameter names.
///
/// Declared on an operation; evaluated against the per-call variable
/// context when the conflict oracle probes a unit pair.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Cmp { op: CmpOp, lhs: Term, rhs: Term },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn cmp(op: CmpOp, lhs: Term, rhs: Term) -> Self {
        Self::Cmp { op, lhs, rhs }
    }

    /// Resolve every named parameter against `ctx`, yielding a solver
    /// expression over scoped variables.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnboundInput`] if a referenced name has no
    /// binding in the context.
    pub fn bind(&self, ctx: &VarCtx, scope: &str) -> Result<Expr, ModelError> {
        match self {
            Self::Cmp { op, lhs, rhs } => Ok(Expr::Cmp {
                op: *op,
                lhs: bind_term(lhs, ctx, scope)?,
                rhs: bind_term(rhs, ctx, scope)?,
            }),
            Self::All(ps) => Ok(Expr::And(
                ps.iter()
                    .map(|p| p.bind(ctx, scope))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Any(ps) => Ok(Expr::Or(
                ps.iter()
                    .map(|p| p.bind(ctx, scope))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Not(p) => Ok(Expr::Not(Box::new(p.bind(ctx, scope)?))),
        }
    }
}

fn bind_term(term: &Term, ctx: &VarCtx, scope: &str) -> Result<Operand, ModelError> {
    match term {
        Term::Param(name) => ctx.get(name).map_or_else(
            || {
                Err(ModelError::UnboundInput {
                    scope: scope.into(),
                    name: name.clone(),
                })
            },
            |var| Ok(Operand::Var(var.clone())),
        ),
        Term::Lit(v) => Ok(Operand::Lit(v.clone())),
    }
}

/// Variable context: declared name to scoped solver variable.
pub type VarCtx = HashMap<String, SmtVar>;

/// A solver variable with a fully scoped name.
///
/// Two `SmtVar`s denote the same solver variable iff their names are equal;
/// the scoping convention guarantees names collide only when the model
/// intends sharing (e.g. a transaction input seen by all of its units).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SmtVar {
    pub name: String,
    pub sort: VarSort,
}

impl SmtVar {
    pub fn new(name: impl Into<String>, sort: VarSort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

/// Expression-level operand: a scoped variable or a literal.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(SmtVar),
    Lit(Value),
}

/// Solver-level boolean expression over scoped variables.
///
/// Produced by binding predicates; consumed by
/// [`SatBackend`](crate::solver::SatBackend) implementations. An edge's
/// assertion set is a list of these, interpreted as a conjunction.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Lit(bool),
    Cmp {
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// The unconstrained placeholder used when neither operation of a
    /// conflicting pair declares a predicate.
    pub const TRUE: Self = Self::Lit(true);

    /// Constant-fold and flatten.
    ///
    /// Folds comparisons between literals of the same sort, flattens nested
    /// conjunctions/disjunctions, drops neutral elements, short-circuits on
    /// absorbing elements, and removes duplicate juncts (keeping first
    /// occurrence order).
    #[must_use]
    pub fn simplify(&self) -> Self {
        match self {
            Self::Lit(_) => self.clone(),
            Self::Cmp { op, lhs, rhs } => {
                if let (Operand::Lit(a), Operand::Lit(b)) = (lhs, rhs) {
                    if let Some(v) = eval_cmp(*op, a, b) {
                        return Self::Lit(v);
                    }
                }
                self.clone()
            }
            Self::And(es) => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for e in es {
                    match e.simplify() {
                        Self::Lit(true) => {}
                        Self::Lit(false) => return Self::Lit(false),
                        Self::And(inner) => {
                            for i in inner {
                                if seen.insert(i.clone()) {
                                    out.push(i);
                                }
                            }
                        }
                        other => {
                            if seen.insert(other.clone()) {
                                out.push(other);
                            }
                        }
                    }
                }
                match out.len() {
                    0 => Self::Lit(true),
                    1 => out.pop().unwrap_or(Self::Lit(true)),
                    _ => Self::And(out),
                }
            }
            Self::Or(es) => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for e in es {
                    match e.simplify() {
                        Self::Lit(false) => {}
                        Self::Lit(true) => return Self::Lit(true),
                        Self::Or(inner) => {
                            for i in inner {
                                if seen.insert(i.clone()) {
                                    out.push(i);
                                }
                            }
                        }
                        other => {
                            if seen.insert(other.clone()) {
                                out.push(other);
                            }
                        }
                    }
                }
                match out.len() {
                    0 => Self::Lit(false),
                    1 => out.pop().unwrap_or(Self::Lit(false)),
                    _ => Self::Or(out),
                }
            }
            Self::Not(e) => match e.simplify() {
                Self::Lit(b) => Self::Lit(!b),
                Self::Not(inner) => *inner,
                other => Self::Not(Box::new(other)),
            },
        }
    }
}

/// Evaluate a comparison between two literals, or `None` if the sorts do
/// not admit it (mismatched sorts, or an ordering on booleans).
fn eval_cmp(op: CmpOp, a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        }),
        (Value::Str(x), Value::Str(y)) => Some(match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        }),
        (Value::Bool(x), Value::Bool(y)) => match op {
            CmpOp::Eq => Some(x == y),
            CmpOp::Ne => Some(x != y),
            _ => None,
        },
        _ => None,
    }
}

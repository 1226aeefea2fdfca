//! Expression evaluation over integers and booleans
//!
//! Follows SMT-LIB integer semantics (`div`/`mod` are Euclidean). Quantifiers
//! range over a finite integer domain supplied by the caller, so a result is
//! only as strong as that domain. Arrays are not modelled.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;

use super::{
    BinOp, Expr, ExprKind, Predicate, Quantifier, STACK_GROW_SIZE, STACK_RED_ZONE, Type, UnaryOp,
    Variable,
};

/// Nesting limit for predicate applications (guards recursive definitions)
const MAX_PREDICATE_DEPTH: usize = 64;

/// Runtime value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    fn type_name(self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
        }
    }

    fn as_int(self) -> Result<i64, EvalError> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(EvalError::Type {
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    fn as_bool(self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::Type {
                expected: "bool",
                found: other.type_name(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unbound variable `{0}`")]
    Unbound(String),

    #[error("type error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("unknown predicate `{0}`")]
    UnknownPredicate(String),

    #[error("predicate `{name}` expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{0} is not supported by the evaluator")]
    Unsupported(&'static str),
}

/// Evaluator with a fixed predicate table and quantifier domain
pub struct Evaluator<'a> {
    predicates: &'a HashMap<String, Predicate>,
    domain: RangeInclusive<i64>,
}

impl<'a> Evaluator<'a> {
    pub fn new(predicates: &'a HashMap<String, Predicate>, domain: RangeInclusive<i64>) -> Self {
        Self { predicates, domain }
    }

    /// Evaluate a boolean expression under an assignment of its free variables
    pub fn holds(&self, expr: &Expr, assignment: &BTreeMap<Variable, Value>) -> Result<bool, EvalError> {
        self.eval(expr, assignment)?.as_bool()
    }

    pub fn eval(&self, expr: &Expr, assignment: &BTreeMap<Variable, Value>) -> Result<Value, EvalError> {
        let mut env: Vec<(String, Value)> = assignment
            .iter()
            .map(|(v, val)| (v.name.clone(), *val))
            .collect();
        self.eval_in(expr, &mut env, 0)
    }

    fn eval_in(&self, expr: &Expr, env: &mut Vec<(String, Value)>, depth: usize) -> Result<Value, EvalError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env, depth))
    }

    fn eval_inner(&self, expr: &Expr, env: &mut Vec<(String, Value)>, depth: usize) -> Result<Value, EvalError> {
        match expr.kind() {
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Var(v) => env
                .iter()
                .rev()
                .find(|(name, _)| *name == v.name)
                .map(|(_, val)| *val)
                .ok_or_else(|| EvalError::Unbound(v.name.clone())),
            ExprKind::Unary { op, operand } => {
                let val = self.eval_in(operand, env, depth)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.as_bool()?)),
                    UnaryOp::Neg => val
                        .as_int()?
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(EvalError::Overflow),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, env, depth),
            ExprKind::Select { .. } | ExprKind::ArrayUpdate { .. } | ExprKind::Length(_) => {
                Err(EvalError::Unsupported("array expression"))
            }
            ExprKind::Apply { predicate, args } => {
                if depth >= MAX_PREDICATE_DEPTH {
                    return Err(EvalError::Unsupported("deeply recursive predicate"));
                }
                let def = self
                    .predicates
                    .get(predicate)
                    .ok_or_else(|| EvalError::UnknownPredicate(predicate.clone()))?;
                if def.parameters.len() != args.len() {
                    return Err(EvalError::Arity {
                        name: predicate.clone(),
                        expected: def.parameters.len(),
                        found: args.len(),
                    });
                }
                let mut frame = Vec::with_capacity(args.len());
                for (param, arg) in def.parameters.iter().zip(args) {
                    frame.push((param.name.clone(), self.eval_in(arg, env, depth)?));
                }
                self.eval_in(&def.body, &mut frame, depth + 1)
            }
            ExprKind::Quantified {
                quantifier,
                bound,
                body,
            } => {
                let result = self.eval_quantified(*quantifier, bound, body, env, depth)?;
                Ok(Value::Bool(result))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        env: &mut Vec<(String, Value)>,
        depth: usize,
    ) -> Result<Value, EvalError> {
        // Short-circuit connectives first
        match op {
            BinOp::And => {
                let l = self.eval_in(lhs, env, depth)?.as_bool()?;
                return Ok(Value::Bool(l && self.eval_in(rhs, env, depth)?.as_bool()?));
            }
            BinOp::Or => {
                let l = self.eval_in(lhs, env, depth)?.as_bool()?;
                return Ok(Value::Bool(l || self.eval_in(rhs, env, depth)?.as_bool()?));
            }
            BinOp::Implies => {
                let l = self.eval_in(lhs, env, depth)?.as_bool()?;
                return Ok(Value::Bool(!l || self.eval_in(rhs, env, depth)?.as_bool()?));
            }
            _ => {}
        }

        let l = self.eval_in(lhs, env, depth)?;
        let r = self.eval_in(rhs, env, depth)?;
        let value = match op {
            BinOp::Add => Value::Int(l.as_int()?.checked_add(r.as_int()?).ok_or(EvalError::Overflow)?),
            BinOp::Sub => Value::Int(l.as_int()?.checked_sub(r.as_int()?).ok_or(EvalError::Overflow)?),
            BinOp::Mul => Value::Int(l.as_int()?.checked_mul(r.as_int()?).ok_or(EvalError::Overflow)?),
            BinOp::Div => {
                let d = r.as_int()?;
                if d == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Value::Int(l.as_int()?.checked_div_euclid(d).ok_or(EvalError::Overflow)?)
            }
            BinOp::Mod => {
                let d = r.as_int()?;
                if d == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Value::Int(l.as_int()?.checked_rem_euclid(d).ok_or(EvalError::Overflow)?)
            }
            BinOp::Lt => Value::Bool(l.as_int()? < r.as_int()?),
            BinOp::Le => Value::Bool(l.as_int()? <= r.as_int()?),
            BinOp::Gt => Value::Bool(l.as_int()? > r.as_int()?),
            BinOp::Ge => Value::Bool(l.as_int()? >= r.as_int()?),
            BinOp::Eq | BinOp::Iff => Value::Bool(same_sort(l, r)? && l == r),
            BinOp::Ne => Value::Bool(!(same_sort(l, r)? && l == r)),
            BinOp::And | BinOp::Or | BinOp::Implies => unreachable!("handled above"),
        };
        Ok(value)
    }

    fn eval_quantified(
        &self,
        quantifier: Quantifier,
        bound: &[Variable],
        body: &Expr,
        env: &mut Vec<(String, Value)>,
        depth: usize,
    ) -> Result<bool, EvalError> {
        let Some((first, rest)) = bound.split_first() else {
            return self.eval_in(body, env, depth)?.as_bool();
        };
        let values: Vec<Value> = match first.ty {
            Type::Int => self.domain.clone().map(Value::Int).collect(),
            Type::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Type::Array(_) => return Err(EvalError::Unsupported("array-valued binder")),
        };
        for value in values {
            env.push((first.name.clone(), value));
            let result = self.eval_quantified(quantifier, rest, body, env, depth);
            env.pop();
            match (quantifier, result?) {
                (Quantifier::Forall, false) => return Ok(false),
                (Quantifier::Exists, true) => return Ok(true),
                _ => {}
            }
        }
        Ok(matches!(quantifier, Quantifier::Forall))
    }
}

fn same_sort(l: Value, r: Value) -> Result<bool, EvalError> {
    match (l, r) {
        (Value::Int(_), Value::Int(_)) | (Value::Bool(_), Value::Bool(_)) => Ok(true),
        (l, r) => Err(EvalError::Type {
            expected: l.type_name(),
            found: r.type_name(),
        }),
    }
}

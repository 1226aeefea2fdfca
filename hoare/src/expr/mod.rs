//! Expression algebra
//!
//! Immutable, structurally shared expression trees. Every operation that
//! "changes" an expression returns a new tree; subtrees that are not
//! touched are shared with the original through reference counting, so a
//! loop invariant can be read by several basic paths without copying.

mod subst;
pub mod eval;

pub use subst::fresh_variable;

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Red zone before the stack is grown for deep expression trees
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
/// Amount of stack added each time the red zone is hit
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

// ============================================================================
// Variables and types
// ============================================================================

/// Sort of a program or logical variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Int,
    Bool,
    /// Integer-indexed array with the given element type
    Array(Box<Type>),
}

impl Type {
    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    /// Element type if this is an array
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            Type::Int | Type::Bool => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Array(elem) => write!(f, "{elem}[]"),
        }
    }
}

/// A named variable. Identity is the pair (name, type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, Type::Int)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, Type::Bool)
    }

    pub fn array(name: impl Into<String>, elem: Type) -> Self {
        Self::new(name, Type::array(elem))
    }

    /// Same variable under a different name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.ty.clone())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Logical negation
    Not,
    /// Arithmetic negation
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Implies,
    Iff,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "==>",
            BinOp::Iff => "<==>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    Forall,
    Exists,
}

// ============================================================================
// Expressions
// ============================================================================

/// Expression node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Var(Variable),
    Unary {
        op: UnaryOp,
        operand: Expr,
    },
    Binary {
        op: BinOp,
        lhs: Expr,
        rhs: Expr,
    },
    /// `array[index]`
    Select {
        array: Expr,
        index: Expr,
    },
    /// Length of an array-valued expression
    Length(Expr),
    /// `array` with `index` replaced by `value`, same `length`
    ArrayUpdate {
        array: Expr,
        index: Expr,
        value: Expr,
        length: Expr,
    },
    /// Application of a registered predicate
    Apply {
        predicate: String,
        args: Vec<Expr>,
    },
    Quantified {
        quantifier: Quantifier,
        bound: Vec<Variable>,
        body: Expr,
    },
}

/// Immutable, cheaply clonable expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expr(Rc<ExprKind>);

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr(Rc::new(kind))
    }
}

impl Expr {
    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// True if both handles point at the same node
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ---- leaves ----

    pub fn bool(value: bool) -> Self {
        ExprKind::Bool(value).into()
    }

    pub fn tt() -> Self {
        Self::bool(true)
    }

    pub fn ff() -> Self {
        Self::bool(false)
    }

    pub fn int(value: i64) -> Self {
        ExprKind::Int(value).into()
    }

    pub fn var(variable: Variable) -> Self {
        ExprKind::Var(variable).into()
    }

    // ---- connectives ----

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        ExprKind::Unary { op, operand }.into()
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        ExprKind::Binary { op, lhs, rhs }.into()
    }

    pub fn not(operand: Expr) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    pub fn neg(operand: Expr) -> Self {
        Self::unary(UnaryOp::Neg, operand)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Or, lhs, rhs)
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Implies, lhs, rhs)
    }

    pub fn iff(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Iff, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Ge, lhs, rhs)
    }

    pub fn equals(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn not_equals(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Ne, lhs, rhs)
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Mul, lhs, rhs)
    }

    // ---- arrays ----

    pub fn select(array: Expr, index: Expr) -> Self {
        ExprKind::Select { array, index }.into()
    }

    pub fn length(array: Expr) -> Self {
        ExprKind::Length(array).into()
    }

    pub fn array_update(array: Expr, index: Expr, value: Expr, length: Expr) -> Self {
        ExprKind::ArrayUpdate {
            array,
            index,
            value,
            length,
        }
        .into()
    }

    // ---- predicates and binders ----

    pub fn apply(predicate: impl Into<String>, args: Vec<Expr>) -> Self {
        ExprKind::Apply {
            predicate: predicate.into(),
            args,
        }
        .into()
    }

    pub fn quantified(quantifier: Quantifier, bound: Vec<Variable>, body: Expr) -> Self {
        ExprKind::Quantified {
            quantifier,
            bound,
            body,
        }
        .into()
    }

    pub fn forall(bound: Vec<Variable>, body: Expr) -> Self {
        Self::quantified(Quantifier::Forall, bound, body)
    }

    pub fn exists(bound: Vec<Variable>, body: Expr) -> Self {
        Self::quantified(Quantifier::Exists, bound, body)
    }

    /// Conjunction of all parts, `true` when empty
    pub fn conjunction(parts: impl IntoIterator<Item = Expr>) -> Self {
        parts
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or_else(Expr::tt)
    }

    /// Disjunction of all parts, `false` when empty
    pub fn disjunction(parts: impl IntoIterator<Item = Expr>) -> Self {
        parts
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or_else(Expr::ff)
    }

    // ---- queries ----

    /// Arithmetic negation at the root (`-e`)
    pub fn is_negation(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        )
    }

    pub fn as_var(&self) -> Option<&Variable> {
        match self.kind() {
            ExprKind::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Variables with at least one occurrence not captured by a binder
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        subst::collect_free(self, &mut Vec::new(), &mut out);
        out
    }

    /// Names of the free variables
    pub fn free_names(&self) -> BTreeSet<String> {
        self.free_variables().into_iter().map(|v| v.name).collect()
    }

    pub fn mentions(&self, var: &Variable) -> bool {
        self.free_variables().contains(var)
    }

    /// Sort of the expression, if it can be synthesised bottom-up.
    /// Predicate applications and quantifiers are boolean.
    pub fn type_of(&self) -> Option<Type> {
        match self.kind() {
            ExprKind::Bool(_) => Some(Type::Bool),
            ExprKind::Int(_) | ExprKind::Length(_) => Some(Type::Int),
            ExprKind::Var(v) => Some(v.ty.clone()),
            ExprKind::Unary { op, .. } => Some(match op {
                UnaryOp::Not => Type::Bool,
                UnaryOp::Neg => Type::Int,
            }),
            ExprKind::Binary { op, .. } if op.is_arithmetic() => Some(Type::Int),
            ExprKind::Binary { .. } => Some(Type::Bool),
            ExprKind::Select { array, .. } => array.type_of()?.element().cloned(),
            ExprKind::ArrayUpdate { array, .. } => array.type_of(),
            ExprKind::Apply { .. } | ExprKind::Quantified { .. } => Some(Type::Bool),
        }
    }
}

// ============================================================================
// Predicate definitions
// ============================================================================

/// A named boolean function usable in annotations through `Apply`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub parameters: Vec<Variable>,
    pub body: Expr,
}

impl Predicate {
    pub fn new(name: impl Into<String>, parameters: Vec<Variable>, body: Expr) -> Self {
        Self {
            name: name.into(),
            parameters,
            body,
        }
    }

    /// Body with the formal parameters replaced by `args`
    pub fn instantiate(&self, args: &[Expr]) -> Option<Expr> {
        if args.len() != self.parameters.len() {
            return None;
        }
        let map: std::collections::BTreeMap<Variable, Expr> = self
            .parameters
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        Some(self.body.substitute_all(&map))
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::Forall => write!(f, "forall"),
            Quantifier::Exists => write!(f, "exists"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Int(n) => write!(f, "{n}"),
            ExprKind::Var(v) => write!(f, "{v}"),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
            },
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprKind::Select { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Length(array) => write!(f, "len({array})"),
            ExprKind::ArrayUpdate {
                array,
                index,
                value,
                length,
            } => write!(f, "{array}{{{index} := {value}; len {length}}}"),
            ExprKind::Apply { predicate, args } => {
                write!(f, "{predicate}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Quantified {
                quantifier,
                bound,
                body,
            } => {
                write!(f, "({quantifier} ")?;
                for (i, v) in bound.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", v.name, v.ty)?;
                }
                write!(f, " :: {body})")
            }
        }
    }
}

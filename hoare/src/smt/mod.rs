//! SMT-LIB2 encoding
//!
//! Turns verification conditions into validity queries: the negated
//! condition is asserted, so `unsat` means valid. Registered predicates
//! become `define-fun` commands shared by every query.
//!
//! Array lengths are modelled by one uninterpreted function per array
//! sort (`len.int`, `len.bool`, `len.arr_int`, ...). The length of an
//! `ArrayUpdate` term is the length it carries.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::expr::{
    BinOp, Expr, ExprKind, Predicate, Quantifier, STACK_GROW_SIZE, STACK_RED_ZONE, Type, UnaryOp,
    Variable,
};
use crate::solver::SolverError;

/// SMT-LIB2 sorts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtSort {
    Int,
    Bool,
    /// `(Array Int T)`
    Array(Box<SmtSort>),
}

impl SmtSort {
    pub fn from_type(ty: &Type) -> Self {
        match ty {
            Type::Int => SmtSort::Int,
            Type::Bool => SmtSort::Bool,
            Type::Array(elem) => SmtSort::Array(Box::new(SmtSort::from_type(elem))),
        }
    }

    /// Convert to SMT-LIB2 string
    pub fn to_smt(&self) -> String {
        match self {
            SmtSort::Int => "Int".to_string(),
            SmtSort::Bool => "Bool".to_string(),
            SmtSort::Array(elem) => format!("(Array Int {})", elem.to_smt()),
        }
    }

    /// Symbol-safe spelling used in length function names
    fn mangle(&self) -> String {
        match self {
            SmtSort::Int => "int".to_string(),
            SmtSort::Bool => "bool".to_string(),
            SmtSort::Array(elem) => format!("arr_{}", elem.mangle()),
        }
    }
}

/// Name of the length function for arrays of `array_sort`
fn length_function(array_sort: &SmtSort) -> Option<String> {
    match array_sort {
        SmtSort::Array(elem) => Some(format!("len.{}", elem.mangle())),
        SmtSort::Int | SmtSort::Bool => None,
    }
}

// ============================================================================
// Generator
// ============================================================================

/// SMT-LIB2 generator for validity queries
#[derive(Debug, Clone, Default)]
pub struct SmtGenerator {
    /// `(predicate name, define-fun command)` in registration order
    definitions: Vec<(String, String)>,
    /// Length functions used by the definitions, keyed by function name
    length_functions: BTreeMap<String, SmtSort>,
}

impl SmtGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate definition.
    ///
    /// Redefining a name replaces the earlier definition in place. The body
    /// may only mention the predicate's parameters and predicates defined
    /// before it.
    pub fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError> {
        let mut lengths = self.length_functions.clone();
        let mut translator = Translator::new(&mut lengths);
        translator.bound = predicate
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let body = translator.translate(&predicate.body)?;
        if let Some(name) = translator.consts.keys().next() {
            return Err(SolverError::Encoding(format!(
                "predicate `{}` mentions free variable `{name}`",
                predicate.name
            )));
        }

        let mut command = format!("(define-fun {} (", symbol(&predicate.name)?);
        for (i, param) in predicate.parameters.iter().enumerate() {
            if i > 0 {
                command.push(' ');
            }
            let _ = write!(
                command,
                "({} {})",
                symbol(&param.name)?,
                SmtSort::from_type(&param.ty).to_smt()
            );
        }
        let _ = write!(command, ") Bool {body})");

        self.length_functions = lengths;
        match self
            .definitions
            .iter_mut()
            .find(|(name, _)| *name == predicate.name)
        {
            Some(slot) => slot.1 = command,
            None => self.definitions.push((predicate.name.clone(), command)),
        }
        Ok(())
    }

    /// Translate a single expression, declaring nothing
    pub fn translate_expr(&self, expr: &Expr) -> Result<String, SolverError> {
        let mut lengths = BTreeMap::new();
        Translator::new(&mut lengths).translate(expr)
    }

    /// Complete script checking the validity of `vc`.
    ///
    /// Layout: length functions, predicate definitions, constants for the
    /// free variables, `(assert (not vc))`, `(check-sat)`, `(get-model)`.
    pub fn validity_query(&self, vc: &Expr) -> Result<String, SolverError> {
        let mut lengths = self.length_functions.clone();
        let mut translator = Translator::new(&mut lengths);
        let formula = translator.translate(vc)?;
        let consts = std::mem::take(&mut translator.consts);

        let mut script = String::new();
        for (name, array_sort) in &lengths {
            let _ = writeln!(script, "(declare-fun {name} ({}) Int)", array_sort.to_smt());
        }
        for (_, command) in &self.definitions {
            let _ = writeln!(script, "{command}");
        }
        for (name, sort) in &consts {
            let _ = writeln!(script, "(declare-const {} {})", symbol(name)?, sort.to_smt());
        }
        let _ = writeln!(script, "(assert (not {formula}))");
        script.push_str("(check-sat)\n(get-model)\n");
        Ok(script)
    }
}

// ============================================================================
// Expression translation
// ============================================================================

struct Translator<'a> {
    /// Free variables met so far
    consts: BTreeMap<String, SmtSort>,
    lengths: &'a mut BTreeMap<String, SmtSort>,
    /// Names bound by enclosing quantifiers or predicate parameters
    bound: Vec<String>,
}

impl<'a> Translator<'a> {
    fn new(lengths: &'a mut BTreeMap<String, SmtSort>) -> Self {
        Self {
            consts: BTreeMap::new(),
            lengths,
            bound: Vec::new(),
        }
    }

    fn translate(&mut self, expr: &Expr) -> Result<String, SolverError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.translate_inner(expr))
    }

    fn translate_inner(&mut self, expr: &Expr) -> Result<String, SolverError> {
        match expr.kind() {
            ExprKind::Bool(b) => Ok(b.to_string()),
            ExprKind::Int(n) if *n < 0 => Ok(format!("(- {})", n.unsigned_abs())),
            ExprKind::Int(n) => Ok(n.to_string()),
            ExprKind::Var(v) => self.variable(v),
            ExprKind::Unary { op, operand } => {
                let operand = self.translate(operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("(not {operand})"),
                    UnaryOp::Neg => format!("(- {operand})"),
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.translate(lhs)?;
                let rhs = self.translate(rhs)?;
                Ok(translate_binop(*op, &lhs, &rhs))
            }
            ExprKind::Select { array, index } => {
                let array = self.translate(array)?;
                let index = self.translate(index)?;
                Ok(format!("(select {array} {index})"))
            }
            ExprKind::Length(array) => {
                if let ExprKind::ArrayUpdate { length, .. } = array.kind() {
                    return self.translate(length);
                }
                let sort = array
                    .type_of()
                    .map(|ty| SmtSort::from_type(&ty))
                    .ok_or_else(|| SolverError::Encoding(format!("cannot type `{array}`")))?;
                let function = length_function(&sort).ok_or_else(|| {
                    SolverError::Encoding(format!("length of non-array `{array}`"))
                })?;
                let array = self.translate(array)?;
                self.lengths.insert(function.clone(), sort);
                Ok(format!("({function} {array})"))
            }
            ExprKind::ArrayUpdate {
                array,
                index,
                value,
                ..
            } => {
                let array = self.translate(array)?;
                let index = self.translate(index)?;
                let value = self.translate(value)?;
                Ok(format!("(store {array} {index} {value})"))
            }
            ExprKind::Apply { predicate, args } => {
                let name = symbol(predicate)?;
                if args.is_empty() {
                    return Ok(name);
                }
                let mut out = format!("({name}");
                for arg in args {
                    let arg = self.translate(arg)?;
                    let _ = write!(out, " {arg}");
                }
                out.push(')');
                Ok(out)
            }
            ExprKind::Quantified {
                quantifier,
                bound,
                body,
            } => {
                if bound.is_empty() {
                    return self.translate(body);
                }
                let mut binders = String::new();
                for (i, v) in bound.iter().enumerate() {
                    if i > 0 {
                        binders.push(' ');
                    }
                    let _ = write!(
                        binders,
                        "({} {})",
                        symbol(&v.name)?,
                        SmtSort::from_type(&v.ty).to_smt()
                    );
                }
                let depth = self.bound.len();
                self.bound.extend(bound.iter().map(|v| v.name.clone()));
                let body = self.translate(body);
                self.bound.truncate(depth);
                let keyword = match quantifier {
                    Quantifier::Forall => "forall",
                    Quantifier::Exists => "exists",
                };
                Ok(format!("({keyword} ({binders}) {})", body?))
            }
        }
    }

    fn variable(&mut self, v: &Variable) -> Result<String, SolverError> {
        let name = symbol(&v.name)?;
        if self.bound.iter().any(|b| *b == v.name) {
            return Ok(name);
        }
        let sort = SmtSort::from_type(&v.ty);
        match self.consts.get(&v.name) {
            Some(existing) if *existing != sort => Err(SolverError::Encoding(format!(
                "variable `{}` used as both {} and {}",
                v.name,
                existing.to_smt(),
                sort.to_smt()
            ))),
            Some(_) => Ok(name),
            None => {
                self.consts.insert(v.name.clone(), sort);
                Ok(name)
            }
        }
    }
}

fn translate_binop(op: BinOp, lhs: &str, rhs: &str) -> String {
    let head = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq | BinOp::Iff => "=",
        BinOp::Ne => return format!("(not (= {lhs} {rhs}))"),
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Implies => "=>",
    };
    format!("({head} {lhs} {rhs})")
}

const RESERVED: &[&str] = &[
    "true", "false", "and", "or", "not", "xor", "ite", "let", "forall", "exists", "select",
    "store", "div", "mod", "abs", "distinct", "par", "as", "_", "!",
];

fn is_simple_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c);
    !first.is_ascii_digit()
        && allowed(first)
        && chars.all(allowed)
        && !RESERVED.contains(&name)
}

/// SMT-LIB2 spelling of a user name, quoted with `|...|` when needed
pub fn symbol(name: &str) -> Result<String, SolverError> {
    if is_simple_symbol(name) {
        return Ok(name.to_string());
    }
    if name.contains(['|', '\\']) {
        return Err(SolverError::Encoding(format!("cannot encode name `{name}`")));
    }
    Ok(format!("|{name}|"))
}

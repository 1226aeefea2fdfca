//! Validity checking backends
//!
//! The verifier talks to a [`Solver`]: predicates are registered once per
//! run, then each verification condition is checked for validity. Two
//! backends are provided:
//!
//! - [`Z3Solver`] pipes SMT-LIB2 to a `z3` subprocess.
//! - [`BoundedSolver`] searches a finite integer domain for a
//!   counterexample. It needs no external tools and never claims validity
//!   for a formula over integers.

mod bounded;
mod parser;
mod z3;

pub use bounded::{BoundedSolver, DEFAULT_MAX_ASSIGNMENTS, SearchOutcome, domain_size};
pub use parser::{SolverOutput, parse_solver_output};
pub use z3::{Z3Config, Z3Solver};

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::expr::{Expr, Predicate};

/// Outcome of a validity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// The formula is falsifiable; the assignment falsifies it
    Invalid(Counterexample),
    /// The solver gave up; the string says why
    Unknown(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Assignment of values to the free variables of a falsified formula
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counterexample {
    /// `(name, value)` pairs in solver order
    pub assignments: Vec<(String, String)>,
}

impl Counterexample {
    pub fn new(assignments: Vec<(String, String)>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

/// Errors from solver interaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("solver binary not found at: {}", .0.display())]
    NotFound(PathBuf),

    #[error("solver process error: {0}")]
    Process(String),

    #[error("failed to parse solver output: {0}")]
    Parse(String),

    /// The formula cannot be expressed in SMT-LIB2
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// A validity oracle.
pub trait Solver {
    /// Make `predicate` available to later queries
    fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError>;

    /// Decide whether `formula` holds for every assignment of its free
    /// variables
    fn check_valid(&mut self, formula: &Expr) -> Result<Validity, SolverError>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError> {
        (**self).define_predicate(predicate)
    }

    fn check_valid(&mut self, formula: &Expr) -> Result<Validity, SolverError> {
        (**self).check_valid(formula)
    }
}

impl<S: Solver + ?Sized> Solver for &mut S {
    fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError> {
        (**self).define_predicate(predicate)
    }

    fn check_valid(&mut self, formula: &Expr) -> Result<Validity, SolverError> {
        (**self).check_valid(formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterexample_display() {
        let cex = Counterexample::new(vec![
            ("x".to_string(), "-1".to_string()),
            ("b".to_string(), "true".to_string()),
        ]);
        assert_eq!(cex.to_string(), "x = -1, b = true");
        assert_eq!(cex.get("x"), Some("-1"));
        assert_eq!(cex.get("y"), None);
    }

    #[test]
    fn test_display_not_found() {
        let err = SolverError::NotFound(PathBuf::from("/no/z3"));
        assert_eq!(err.to_string(), "solver binary not found at: /no/z3");
    }

    #[test]
    fn test_boxed_solver_delegates() {
        let mut solver: Box<dyn Solver> = Box::new(BoundedSolver::new(2));
        assert_eq!(solver.check_valid(&Expr::tt()).unwrap(), Validity::Valid);
    }
}

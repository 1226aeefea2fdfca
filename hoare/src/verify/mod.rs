//! Verification driver
//!
//! Decomposes every function into basic paths, generates partial
//! correctness and termination conditions for each path, and asks the
//! solver to prove them.
//!
//! - `paths`: basic-path decomposition
//! - `vc`: weakest preconditions and partial correctness
//! - `termination`: lexicographic ranking-function decrease

pub mod paths;
pub mod termination;
pub mod vc;

pub use paths::{BasicPath, find_basic_paths};
pub use vc::{PathContext, PathEnd};

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::expr::Expr;
use crate::ir::{Function, LocationId, Program};
use crate::solver::{Counterexample, Solver, Validity};

/// What a verification condition establishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObligationKind {
    PartialCorrectness,
    Termination,
    /// A ranking function is an arithmetic negation; fails without a query
    MalformedRanking,
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObligationKind::PartialCorrectness => write!(f, "partial correctness"),
            ObligationKind::Termination => write!(f, "termination"),
            ObligationKind::MalformedRanking => write!(f, "malformed ranking function"),
        }
    }
}

/// A single formula to be proved valid
#[derive(Debug, Clone, PartialEq)]
pub struct Obligation {
    pub function: String,
    pub path: BasicPath,
    pub kind: ObligationKind,
    pub formula: Expr,
}

/// Why a run was judged invalid
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub function: String,
    pub path: Vec<LocationId>,
    pub kind: ObligationKind,
    pub formula: Expr,
    /// Falsifying assignment, when the solver produced one
    pub counterexample: Option<Counterexample>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fails in `{}` on path [", self.kind, self.function)?;
        for (i, loc) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{loc}")?;
        }
        write!(f, "]")?;
        match &self.counterexample {
            Some(cex) if !cex.is_empty() => write!(f, " with {cex}"),
            _ => Ok(()),
        }
    }
}

/// Outcome of verifying a whole program
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid(Failure),
    Unknown(String),
}

impl Verdict {
    /// `+1` valid, `-1` invalid, `0` unknown
    pub fn code(&self) -> i32 {
        match self {
            Verdict::Valid => 1,
            Verdict::Invalid(_) => -1,
            Verdict::Unknown(_) => 0,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => write!(f, "valid"),
            Verdict::Invalid(failure) => write!(f, "invalid: {failure}"),
            Verdict::Unknown(reason) => write!(f, "unknown: {reason}"),
        }
    }
}

/// Every obligation of one basic path, in checking order.
///
/// A negated ranking function at the path start yields a single
/// `MalformedRanking` obligation and nothing else.
pub fn path_obligations(
    program: &Program,
    func: &Function,
    path: &BasicPath,
) -> Result<Vec<Obligation>> {
    let obligation = |kind, formula| Obligation {
        function: func.name.clone(),
        path: path.clone(),
        kind,
        formula,
    };

    let mut ctx = PathContext::new(program, func, path)?;
    if ctx.entry_ranking_functions()?.iter().any(Expr::is_negation) {
        return Ok(vec![obligation(ObligationKind::MalformedRanking, Expr::ff())]);
    }

    let mut out = vec![obligation(
        ObligationKind::PartialCorrectness,
        ctx.partial_correctness()?,
    )];
    let pre = ctx.precondition()?;
    let end = ctx.end()?;
    for formula in termination::termination_conditions(&mut ctx, &pre, &end)? {
        out.push(obligation(ObligationKind::Termination, formula));
    }
    Ok(out)
}

/// Every obligation of the program, without consulting a solver
pub fn obligations(program: &Program) -> Result<Vec<Obligation>> {
    program.validate()?;
    let mut out = Vec::new();
    for func in &program.functions {
        for path in find_basic_paths(func)? {
            out.extend(path_obligations(program, func, &path)?);
        }
    }
    Ok(out)
}

/// Program verifier over a validity oracle
pub struct Verifier<S> {
    solver: S,
}

impl<S: Solver> Verifier<S> {
    pub fn new(solver: S) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    /// Verify every function of `program`.
    ///
    /// Stops at the first invalid obligation. An unknown answer does not
    /// stop the run: a later invalid obligation still makes the verdict
    /// invalid, otherwise the first unknown reason is reported.
    pub fn apply(&mut self, program: &Program) -> Result<Verdict> {
        program.validate()?;
        for predicate in &program.predicates {
            self.solver.define_predicate(predicate)?;
        }

        let mut unknown: Option<String> = None;
        let mut checked = 0usize;
        for func in &program.functions {
            let paths = find_basic_paths(func)?;
            debug!(function = %func.name, paths = paths.len(), "decomposed");

            for path in &paths {
                for obligation in path_obligations(program, func, path)? {
                    if let Some(verdict) = self.discharge(obligation, &mut unknown)? {
                        return Ok(verdict);
                    }
                    checked += 1;
                }
            }
        }

        info!(checked, "all obligations discharged");
        Ok(match unknown {
            Some(reason) => Verdict::Unknown(reason),
            None => Verdict::Valid,
        })
    }

    /// Check one obligation; `Some` ends the run
    fn discharge(
        &mut self,
        obligation: Obligation,
        unknown: &mut Option<String>,
    ) -> Result<Option<Verdict>> {
        let Obligation {
            function,
            path,
            kind,
            formula,
        } = obligation;
        let failure = |counterexample| Failure {
            function: function.clone(),
            path: path.locations(),
            kind,
            formula: formula.clone(),
            counterexample,
        };

        if kind == ObligationKind::MalformedRanking {
            warn!(%function, %path, "ranking function is a negation");
            return Ok(Some(Verdict::Invalid(failure(None))));
        }

        match self.solver.check_valid(&formula)? {
            Validity::Valid => {
                debug!(%function, %path, %kind, "valid");
                Ok(None)
            }
            Validity::Invalid(cex) => {
                warn!(%function, %path, %kind, %formula, counterexample = %cex, "invalid");
                Ok(Some(Verdict::Invalid(failure(Some(cex)))))
            }
            Validity::Unknown(reason) => {
                warn!(%function, %path, %kind, %reason, "unknown");
                unknown.get_or_insert(format!("{kind} in `{function}` on {path}: {reason}"));
                Ok(None)
            }
        }
    }
}

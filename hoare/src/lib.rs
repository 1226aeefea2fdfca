//! Hoare-style deductive verifier
//!
//! Checks partial correctness and termination of programs given as
//! annotated control-flow graphs. Each function is cut into basic paths at
//! its specification points, a verification condition is computed for
//! every path by backward weakest-precondition reasoning, and the
//! conditions are discharged by an SMT solver.
//!
//! ```
//! use hoare::expr::{Expr, Variable};
//! use hoare::ir::{FunctionBuilder, Program, Statement};
//! use hoare::solver::BoundedSolver;
//! use hoare::verify::{Verdict, Verifier};
//!
//! // x >= -1 does not guarantee x + 1 > 0
//! let x = Variable::int("x");
//! let mut b = FunctionBuilder::new("inc");
//! let entry = b.entry(vec![Expr::ge(Expr::var(x.clone()), Expr::int(-1))], vec![]);
//! let exit = b.exit(vec![Expr::gt(Expr::var(x.clone()), Expr::int(0))]);
//! b.edge(entry, exit, Statement::assign(x.clone(), Expr::add(Expr::var(x.clone()), Expr::int(1))));
//! let program = Program::new(vec![], vec![b.parameter(x).build().unwrap()]);
//!
//! let verdict = Verifier::new(BoundedSolver::new(8)).apply(&program).unwrap();
//! assert_eq!(verdict.code(), -1);
//! if let Verdict::Invalid(failure) = verdict {
//!     assert_eq!(failure.counterexample.unwrap().get("x"), Some("-1"));
//! }
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod ir;
pub mod smt;
pub mod solver;
pub mod verify;

pub use error::{Result, VerifyError};
pub use verify::{Verdict, Verifier};

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

use super::parser::{SolverOutput, parse_solver_output};
use super::{Counterexample, Solver, SolverError, Validity};
use crate::expr::{Expr, Predicate};
use crate::smt::SmtGenerator;

/// Common installation paths checked when `z3` is not on `PATH`
const COMMON_PATHS: &[&str] = &["/opt/homebrew/bin/z3", "/usr/local/bin/z3", "/usr/bin/z3"];

/// How to run the Z3 binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Z3Config {
    pub path: PathBuf,
    /// Per-query timeout in milliseconds (0 = none)
    pub timeout_ms: u64,
    pub extra_args: Vec<String>,
}

impl Z3Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout_ms: 0,
            extra_args: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Locate `z3`: `which z3` first, then the common install paths
    pub fn auto_detect() -> Result<Self, SolverError> {
        if let Ok(output) = Command::new("which").arg("z3").output()
            && output.status.success()
        {
            let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !found.is_empty() {
                let path = PathBuf::from(found);
                if path.exists() {
                    return Ok(Self::new(path));
                }
            }
        }

        COMMON_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .map(Self::new)
            .ok_or_else(|| SolverError::NotFound(PathBuf::from("z3")))
    }

    /// Command-line arguments for a stdin session
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-in".to_string()];
        if self.timeout_ms > 0 {
            args.push(format!("-t:{}", self.timeout_ms));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.path.exists() {
            return Err(SolverError::NotFound(self.path.clone()));
        }
        Ok(())
    }
}

/// Z3 run as one subprocess per query
#[derive(Debug)]
pub struct Z3Solver {
    config: Z3Config,
    generator: SmtGenerator,
}

impl Z3Solver {
    pub fn new(config: Z3Config) -> Self {
        Self {
            config,
            generator: SmtGenerator::new(),
        }
    }

    pub fn auto_detect() -> Result<Self, SolverError> {
        Ok(Self::new(Z3Config::auto_detect()?))
    }

    pub fn config(&self) -> &Z3Config {
        &self.config
    }

    /// Script that [`Solver::check_valid`] would send for `formula`
    pub fn query(&self, formula: &Expr) -> Result<String, SolverError> {
        self.generator.validity_query(formula)
    }

    /// Run a raw SMT-LIB2 script
    pub fn run(&self, script: &str) -> Result<SolverOutput, SolverError> {
        self.config.validate()?;

        let mut child = Command::new(&self.config.path)
            .args(self.config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Process(format!("failed to start z3: {e}")))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| SolverError::Process("failed to open z3 stdin".to_string()))?;
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| SolverError::Process(format!("failed to write to z3 stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SolverError::Process(format!("failed to wait for z3: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!(%stdout, %stderr, "z3 reply");

        parse_solver_output(&stdout, &stderr)
    }
}

impl Solver for Z3Solver {
    fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError> {
        self.generator.define_predicate(predicate)
    }

    fn check_valid(&mut self, formula: &Expr) -> Result<Validity, SolverError> {
        let script = self.query(formula)?;
        debug!(%script, "z3 query");
        Ok(match self.run(&script)? {
            SolverOutput::Unsat => Validity::Valid,
            SolverOutput::Sat(model) => Validity::Invalid(Counterexample::new(model)),
            SolverOutput::Unknown(reason) => Validity::Unknown(reason),
        })
    }
}

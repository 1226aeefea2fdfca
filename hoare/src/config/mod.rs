//! Configuration Management
//!
//! Settings are read from `hoare.toml`; every field has a default, so an
//! empty or missing file is a valid configuration.
//!
//! ```toml
//! [solver]
//! backend = "z3"          # or "bounded"
//! path = "/usr/bin/z3"    # auto-detected when omitted
//! timeout_ms = 10000
//! extra_args = []
//! bound = 16              # bounded backend: integer range [-bound, bound]
//! max_assignments = 1000000  # at least 2 * bound + 1
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::solver::{BoundedSolver, Solver, Z3Config, Z3Solver, domain_size};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "hoare.toml";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Which validity oracle to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Z3,
    Bounded,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Z3 => write!(f, "z3"),
            Backend::Bounded => write!(f, "bounded"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "z3" => Ok(Backend::Z3),
            "bounded" => Ok(Backend::Bounded),
            _ => Err(format!("unknown solver backend: {s} (expected z3 or bounded)")),
        }
    }
}

/// Solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: Backend,
    /// Z3 binary; auto-detected when unset
    pub path: Option<PathBuf>,
    /// Per-query timeout in milliseconds (0 = none)
    pub timeout_ms: u64,
    pub extra_args: Vec<String>,
    /// Bounded backend: integers range over `[-bound, bound]`
    pub bound: i64,
    /// Bounded backend: assignments tried per query before giving up
    pub max_assignments: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Z3,
            path: None,
            timeout_ms: 10_000,
            extra_args: Vec::new(),
            bound: 16,
            max_assignments: crate::solver::DEFAULT_MAX_ASSIGNMENTS,
        }
    }
}

impl SolverConfig {
    /// Instantiate the configured backend
    pub fn build(&self) -> Result<Box<dyn Solver>> {
        match self.backend {
            Backend::Z3 => {
                let config = match &self.path {
                    Some(path) => Z3Config::new(path),
                    None => Z3Config::auto_detect()?,
                };
                let config = config
                    .with_timeout(self.timeout_ms)
                    .with_extra_args(self.extra_args.clone());
                config.validate()?;
                Ok(Box::new(Z3Solver::new(config)))
            }
            Backend::Bounded => Ok(Box::new(
                BoundedSolver::new(self.bound).with_max_assignments(self.max_assignments),
            )),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.solver.bound < 0 {
            return Err(VerifyError::config(format!(
                "solver.bound must be non-negative, got {}",
                self.solver.bound
            )));
        }
        if self.solver.max_assignments == 0 {
            return Err(VerifyError::config("solver.max_assignments must be > 0"));
        }
        match domain_size(self.solver.bound) {
            Some(size) if size <= self.solver.max_assignments => {}
            _ => {
                return Err(VerifyError::config(format!(
                    "solver.bound {} gives more values than solver.max_assignments ({})",
                    self.solver.bound, self.solver.max_assignments
                )));
            }
        }
        Ok(())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| VerifyError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// `hoare.toml` in the working directory if present, defaults otherwise
    pub fn load_default() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VerifyError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_solver_section() {
        let config = Config::from_toml("[solver]\nbackend = \"bounded\"\nbound = 4\n").unwrap();
        assert_eq!(config.solver.backend, Backend::Bounded);
        assert_eq!(config.solver.bound, 4);
        assert_eq!(config.solver.timeout_ms, 10_000);
        assert!(config.solver.path.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("[solver]\nbound = -1\n").is_err());
        assert!(Config::from_toml("[solver]\nmax_assignments = 0\n").is_err());
        assert!(Config::from_toml("[solver]\nbackend = \"cvc5\"\n").is_err());
    }

    #[test]
    fn test_bound_limited_by_search_cap() {
        let huge = "[solver]\nbackend = \"bounded\"\nbound = 4000000000000\n";
        assert!(matches!(Config::from_toml(huge), Err(VerifyError::Config { .. })));
        assert!(Config::from_toml("[solver]\nbound = 4\nmax_assignments = 8\n").is_err());
        assert!(Config::from_toml("[solver]\nbound = 4\nmax_assignments = 9\n").is_ok());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = Config::default();
        config.solver.path = Some(PathBuf::from("/opt/z3/bin/z3"));
        config.solver.extra_args = vec!["smt.mbqi=true".to_string()];
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Z3".parse::<Backend>().unwrap(), Backend::Z3);
        assert_eq!("bounded".parse::<Backend>().unwrap(), Backend::Bounded);
        assert!("yices".parse::<Backend>().is_err());
    }

    #[test]
    fn test_build_bounded() {
        let config = SolverConfig {
            backend: Backend::Bounded,
            bound: 2,
            ..SolverConfig::default()
        };
        let mut solver = config.build().unwrap();
        assert!(solver.check_valid(&crate::expr::Expr::tt()).unwrap().is_valid());
    }

    #[test]
    fn test_build_z3_missing_binary() {
        let config = SolverConfig {
            path: Some(PathBuf::from("/nonexistent/z3")),
            ..SolverConfig::default()
        };
        assert!(matches!(config.build(), Err(VerifyError::Solver(_))));
    }
}

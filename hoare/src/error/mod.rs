//! Error types

use thiserror::Error;

use crate::solver::SolverError;

/// Result type alias
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Errors that stop a verification run before a verdict is reached.
///
/// A specification that does not hold is not an error: it is reported as
/// [`crate::verify::Verdict::Invalid`].
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Call arity, ranking tuple length, and similar shape mismatches
    #[error("Structural mismatch in `{function}`: {message}")]
    StructuralMismatch { function: String, message: String },

    /// The CFG violates an invariant the verifier relies on
    #[error("Malformed CFG in `{function}`: {message}")]
    MalformedCfg { function: String, message: String },

    #[error("Unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    /// IR input could not be decoded
    #[error("IR error: {message}")]
    Ir { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl VerifyError {
    pub fn structural(function: &str, message: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed_cfg(function: &str, message: impl Into<String>) -> Self {
        Self::MalformedCfg {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::UnknownFunction {
            name: name.to_string(),
        }
    }

    pub fn ir(message: impl Into<String>) -> Self {
        Self::Ir {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Function the error is attributed to, if any
    pub fn function(&self) -> Option<&str> {
        match self {
            Self::StructuralMismatch { function, .. } | Self::MalformedCfg { function, .. } => {
                Some(function)
            }
            Self::UnknownFunction { .. }
            | Self::Solver(_)
            | Self::Ir { .. }
            | Self::Config { .. }
            | Self::Io { .. } => None,
        }
    }
}

impl From<std::io::Error> for VerifyError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_structural() {
        let err = VerifyError::structural("main", "call to `f` passes 1 arguments, expected 2");
        assert_eq!(
            err.to_string(),
            "Structural mismatch in `main`: call to `f` passes 1 arguments, expected 2"
        );
        assert_eq!(err.function(), Some("main"));
    }

    #[test]
    fn test_display_unknown_function() {
        let err = VerifyError::unknown_function("g");
        assert_eq!(err.to_string(), "Unknown function `g`");
        assert_eq!(err.function(), None);
    }

    #[test]
    fn test_from_solver_error() {
        let err: VerifyError = SolverError::Process("z3 crashed".to_string()).into();
        assert!(matches!(err, VerifyError::Solver(SolverError::Process(_))));
        assert_eq!(err.to_string(), "Solver error: solver process error: z3 crashed");
    }
}

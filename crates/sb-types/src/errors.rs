use thiserror::Error;

/// Main error type for splatbench
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while building trial specifications and plans
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Unknown option: {name}")]
    UnknownOption { name: String },

    #[error("Option {option} expects a {expected} value, got {actual}")]
    WrongKind {
        option: String,
        expected: &'static str,
        actual: String,
    },

    #[error("Option {option} given more than once")]
    DuplicateOption { option: String },

    #[error("Duplicate trial name: {name}")]
    DuplicateTrial { name: String },

    #[error("Invalid trial name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("No trials match {requested}; available: {available}")]
    NoMatch { requested: String, available: String },
}

/// Why a single trial did not succeed.
///
/// Every variant is recovered into a `TrialOutcome`; none of them aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrialFailure {
    #[error("{0}")]
    Launch(String),

    #[error("Timeout")]
    Timeout,

    #[error("{stderr}")]
    Process { code: Option<i32>, stderr: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for splatbench operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BenchError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BenchError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PlanError::WrongKind {
            option: "num-iters".to_string(),
            expected: "integer",
            actual: "0.5".to_string(),
        };

        assert!(error.to_string().contains("num-iters"));
        assert!(error.to_string().contains("integer"));
        assert!(error.to_string().contains("0.5"));
    }

    #[test]
    fn test_error_conversion() {
        let plan_error = PlanError::DuplicateTrial {
            name: "baseline".to_string(),
        };
        let bench_error: BenchError = plan_error.into();

        match bench_error {
            BenchError::Plan(_) => (),
            _ => panic!("Expected Plan error"),
        }
    }

    #[test]
    fn timeout_displays_bare_word() {
        assert_eq!(TrialFailure::Timeout.to_string(), "Timeout");
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, BenchError::Validation(_)));
        let config_err = config_error!("Missing required field: {}", "tool_path");
        assert!(config_err.to_string().contains("tool_path"));
    }
}

//! Error types.
//!
//! Two layers:
//!
//! - [`EngineError`] is the engine taxonomy. Batch-level variants propagate to
//!   the caller; `DegenerateMatrix` and `LoanComputation` are isolated per
//!   segment / per loan by the pipeline and reported next to the results.
//! - [`AppError`] is what the `ecl` binary prints, carrying a process exit code.

use thiserror::Error;

/// Engine-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Bad matrix size, non-positive horizon, unsupported period, etc.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The whole input is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A segment's matrix cannot be turned into a valid stochastic matrix.
    #[error("degenerate matrix for segment `{segment}`: {reason}")]
    DegenerateMatrix { segment: String, reason: String },

    /// Amortization / LGD / ECL failed for one loan.
    #[error("loan `{account_id}`: {reason}")]
    LoanComputation { account_id: String, reason: String },
}

impl EngineError {
    pub fn degenerate(segment: &str, reason: impl std::fmt::Display) -> Self {
        EngineError::DegenerateMatrix {
            segment: segment.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn loan(account_id: &str, reason: impl Into<String>) -> Self {
        EngineError::LoanComputation {
            account_id: account_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of the low-level matrix routines in [`crate::math`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix contains non-finite entries")]
    NonFinite,

    #[error("matrix is singular")]
    Singular,

    #[error("{0} did not converge")]
    NoConvergence(&'static str),

    #[error("row {row} has no probability mass")]
    InvalidRow { row: usize },
}

/// Error printed by the binary, with the exit code it maps to.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let code = match err {
            EngineError::InvalidConfig(_) => 2,
            EngineError::InvalidInput(_) => 3,
            EngineError::DegenerateMatrix { .. } | EngineError::LoanComputation { .. } => 4,
        };
        AppError::new(code, err.to_string())
    }
}

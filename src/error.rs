//! Error types.
//!
//! Library code returns [`XsecError`]; the `xsec` binary converts it into an
//! [`AppError`] carrying a process exit code.

use thiserror::Error;

use crate::domain::SystType;

/// Failures raised by the measurement and propagation layers.
#[derive(Error, Debug)]
pub enum XsecError {
    /// A systematic was built with a universe count its kind does not allow.
    #[error("systematic '{name}': {kind} expects {expected} universe(s), got {got}")]
    Cardinality {
        name: String,
        kind: SystType,
        expected: &'static str,
        got: usize,
    },

    /// An operation needs at least one universe.
    #[error("systematic '{0}' holds no universes")]
    Arity(String),

    /// An operation was called on a systematic of the wrong kind.
    #[error("{op} on systematic '{name}': expected {expected}, got {got}")]
    SystematicType {
        op: &'static str,
        name: String,
        expected: &'static str,
        got: SystType,
    },

    /// A cross section is missing one of its sub-calculators.
    #[error("incomplete measurement: missing {component}")]
    IncompleteMeasurement { component: &'static str },

    /// Two histograms with different binning were combined.
    #[error("binning mismatch: {0}")]
    BinningMismatch(String),

    /// A matrix that must be inverted is singular or not positive definite.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Two systematics were registered under the same name.
    #[error("duplicate systematic name '{0}'")]
    DuplicateName(String),

    /// A systematic name was looked up but never registered.
    #[error("unknown systematic '{0}'")]
    UnknownSystematic(String),

    /// A template label was referenced but the measurement does not provide it.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// Histogram construction violated an invariant.
    #[error("invalid histogram: {0}")]
    InvalidHistogram(String),

    /// A persisted group is malformed or of an unexpected type.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, XsecError>;

impl XsecError {
    /// Exit code used by the binary for this class of failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            XsecError::Persistence(_) | XsecError::Io(_) | XsecError::Json(_) => 3,
            XsecError::Cardinality { .. }
            | XsecError::Arity(_)
            | XsecError::DuplicateName(_)
            | XsecError::UnknownSystematic(_)
            | XsecError::UnknownTemplate(_)
            | XsecError::InvalidHistogram(_) => 2,
            XsecError::SystematicType { .. }
            | XsecError::IncompleteMeasurement { .. }
            | XsecError::BinningMismatch(_)
            | XsecError::SingularMatrix(_) => 4,
        }
    }
}

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

impl From<XsecError> for AppError {
    fn from(err: XsecError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_keeps_exit_code_of_library_error() {
        let err: AppError = XsecError::SingularMatrix("covariance".into()).into();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("covariance"));

        let err: AppError = XsecError::DuplicateName("flux".into()).into();
        assert_eq!(err.exit_code(), 2);
    }
}

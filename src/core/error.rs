use super::cancel::CancelCause;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Cancelled: {0}")]
    Cancelled(CancelCause),

    #[error("Invalid targeting: {0}")]
    InvalidTargeting(String),

    #[error("Function '{0}' is not registered")]
    FunctionNotFound(String),

    #[error("Member '{0}' not found")]
    MemberNotFound(String),

    #[error("Function '{function}' failed on member '{member}': {message}")]
    FunctionFailed {
        function: String,
        member: String,
        message: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl GridError {
    /// Returns the cancellation cause when this error came from a tripped cancel criterion.
    pub fn cancel_cause(&self) -> Option<&CancelCause> {
        match self {
            GridError::Cancelled(cause) => Some(cause),
            _ => None,
        }
    }

    /// Lookup failures are permanent for a dispatch and never retried.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            GridError::FunctionNotFound(_) | GridError::MemberNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GridError>;

impl<T> From<std::sync::PoisonError<T>> for GridError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

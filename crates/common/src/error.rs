use std::any::Any;

use thiserror::Error;

/// Unified error type for Frost crates.
///
/// Errors travel verbatim from a plan node through its stage to the
/// pipeline, so the type is `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Execution context cancelled")]
    Cancelled,
    #[error("Execution context deadline exceeded")]
    DeadlineExceeded,
    #[error("Task rejected: {0}")]
    Rejected(String),
    #[error("Task panicked: {0}")]
    Panic(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Flush failed: {0}")]
    Flush(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn execution(msg: impl Into<String>) -> Self {
        Error::Execution(msg.into())
    }

    /// Builds a [`Error::Panic`] from the payload returned by
    /// `std::panic::catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::Panic(msg)
    }

    /// True for the errors raised by context cancellation or expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

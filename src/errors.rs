use std::str::FromStr;

use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use thiserror::Error;

/// Error types for queue receive, visibility and acknowledgment operations.
///
/// "No messages available" is not an error; it is an empty receive result.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A receive configuration or request parameter was rejected locally.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The receipt handle is unknown, superseded or already used.
    #[error("receipt handle is invalid: {0}")]
    ReceiptHandleInvalid(String),

    /// The visibility of a message that is not in flight cannot be changed.
    #[error("message is not in flight: {0}")]
    MessageNotInFlight(String),

    /// The remote service returned a failure for `operation`.
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    #[error("{0}")]
    GenericError(#[from] GenericError),
}

impl QueueError {
    pub(crate) fn service<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        QueueError::Service {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        QueueError::InvalidConfig(message.into())
    }
}

/// Generic error type returned by message handlers.
#[derive(Debug, Error)]
pub struct GenericError(String);

impl GenericError {
    /// Creates a new `GenericError` with the provided message.
    pub fn new(message: String) -> Self {
        GenericError(message)
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenericError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenericError::new(s.to_string()))
    }
}

impl From<String> for GenericError {
    fn from(s: String) -> Self {
        GenericError::new(s)
    }
}

impl From<&str> for GenericError {
    fn from(s: &str) -> Self {
        GenericError::new(s.to_string())
    }
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

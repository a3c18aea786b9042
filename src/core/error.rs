//! Error types for pipeline stages and cancellation contexts.

use std::sync::Arc;

/// The main error type for the pipeline system.
///
/// Cancellation is modelled as an error only where a caller explicitly asks
/// why work stopped (a [`Context`](crate::core::Context), a cancellable send,
/// a lookup). Streams themselves simply end.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The shared cancellation signal was raised
    #[error("operation was cancelled")]
    Cancelled,

    /// A deadline-derived signal fired before the operation finished
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The other side of a stream was dropped
    #[error("stream was closed")]
    ChannelClosed,

    /// A pipeline run exceeded its configured operation timeout
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// An element could not be converted to the requested type
    #[error("cannot convert element to {expected}: {reason}")]
    Conversion {
        expected: &'static str,
        reason: String,
    },

    /// A locale lookup returned something the caller cannot handle
    #[error("unsupported locale {0:?}")]
    UnsupportedLocale(String),

    /// A processor failed to transform an item
    #[error("processor error: {0}")]
    Processor(Arc<dyn std::error::Error + Send + Sync>),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Create a processor error from any error type
    pub fn processor<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Processor(Arc::new(error))
    }

    /// Create a conversion error for target type `T`
    pub fn conversion<T>(reason: impl Into<String>) -> Self {
        Error::Conversion {
            expected: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Error::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// True for the two ways a signal can stop work: explicit cancel or deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::DeadlineExceeded
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::custom(format!("stage task panicked: {}", err))
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

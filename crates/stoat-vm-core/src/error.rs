//! Engine-side error type.

use thiserror::Error;

/// Error raised while executing host-native code against the engine.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("Error: {0}")]
    Generic(String),
    /// The isolate was torn down while the call was in flight.
    #[error("isolate has been disposed")]
    Disposed,
}

impl VmError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// The message portion, without the error-class prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Type(m) | Self::Range(m) | Self::Generic(m) => m,
            Self::Disposed => "isolate has been disposed",
        }
    }
}

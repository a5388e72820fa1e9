use std::fmt::Display;

use thiserror::Error;

/// Errors produced by the cache layer
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unsupported argument type: {kind}")]
    UnsupportedArgument { kind: String },

    #[error("Unsupported value type: {kind}")]
    UnsupportedValue { kind: String },

    #[error("Invalid computation: {message}")]
    InvalidComputation { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache backend is closed")]
    Closed,
}

impl CacheError {
    pub fn unsupported_argument(kind: impl Into<String>) -> Self {
        Self::UnsupportedArgument { kind: kind.into() }
    }

    pub fn unsupported_value(kind: impl Into<String>) -> Self {
        Self::UnsupportedValue { kind: kind.into() }
    }

    pub fn invalid_computation(message: impl Into<String>) -> Self {
        Self::InvalidComputation {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for caller mistakes that must never be retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedArgument { .. }
                | Self::UnsupportedValue { .. }
                | Self::InvalidComputation { .. }
                | Self::Validation { .. }
        )
    }
}

impl serde::ser::Error for CacheError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::serialization(msg.to_string())
    }
}

impl serde::de::Error for CacheError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::serialization(msg.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

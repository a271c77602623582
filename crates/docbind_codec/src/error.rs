//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or converting values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Text is not the 24-character hex form of an object id.
    #[error("invalid object id: '{value}'")]
    InvalidObjectId {
        /// The rejected text.
        value: String,
    },

    /// A timestamp could not be represented as a calendar instant.
    #[error("invalid date: {message}")]
    InvalidDate {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid object id error.
    pub fn invalid_object_id(value: impl Into<String>) -> Self {
        Self::InvalidObjectId {
            value: value.into(),
        }
    }

    /// Create an invalid date error.
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate {
            message: message.into(),
        }
    }
}


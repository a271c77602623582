//! Error types for docbind core.

use crate::store::StoreError;
use docbind_codec::{CodecError, DateTime};
use std::fmt::Display;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while mapping, validating or persisting entities.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage document violates the entity schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A document key contains a literal dot.
    #[error("invalid document key: '{key}'")]
    InvalidDocumentKey {
        /// The offending key.
        key: String,
    },

    /// Error surfaced by the document store, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A field typed as an identifier received an unparseable value.
    #[error("field '{field}' cannot hold identifier value '{value}'")]
    InvalidIdentifier {
        /// Field being merged.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// An encrypted field was touched but no passphrase is configured.
    #[error("encryption key not configured")]
    EncryptionNotConfigured,

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key, corrupted or malformed ciphertext).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// No relation with this name is declared.
    #[error("unknown relation: '{name}'")]
    UnknownRelation {
        /// The requested relation.
        name: String,
    },

    /// A custom-type decoder rejected a value.
    #[error("cannot decode field '{field}': {message}")]
    CustomDecode {
        /// Field being merged.
        field: String,
        /// Decoder message.
        message: String,
    },

    /// Value model error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates an invalid document key error.
    pub fn invalid_document_key(key: impl Into<String>) -> Self {
        Self::InvalidDocumentKey { key: key.into() }
    }

    /// Creates an unknown relation error.
    pub fn unknown_relation(name: impl Into<String>) -> Self {
        Self::UnknownRelation { name: name.into() }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a custom decode error.
    pub fn custom_decode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CustomDecode {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// A required field is missing.
    Required,
    /// A field holds a value of the wrong type.
    Type,
    /// A number or date is outside its bounds.
    Range,
    /// A text value does not match its pattern.
    Pattern,
}

/// Schema violations detected before a write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is not a key of the storage document.
    #[error("missing required field: '{field}'")]
    RequiredFieldMissing {
        /// Name of the missing field.
        field: String,
    },

    /// A field holds a value of the wrong type.
    #[error("field '{field}' must be of type '{expected}'")]
    InvalidFieldType {
        /// Expected type (`Number`, `String`, `Boolean`, `ObjectId`, `Date`, `Email`).
        expected: &'static str,
        /// Name of the field.
        field: String,
    },

    /// A number is below its minimum or above its maximum.
    #[error("provided value '{value}' must be {}", bound(.min, .max))]
    NumberOutOfRange {
        /// The rejected value.
        value: f64,
        /// The violated minimum, if the minimum was violated.
        min: Option<f64>,
        /// The violated maximum, if the maximum was violated.
        max: Option<f64>,
    },

    /// A date is before its minimum or after its maximum.
    #[error("provided value '{value}' must be {}", bound(.min, .max))]
    DateOutOfRange {
        /// The rejected value.
        value: DateTime,
        /// The violated minimum, if the minimum was violated.
        min: Option<DateTime>,
        /// The violated maximum, if the maximum was violated.
        max: Option<DateTime>,
    },

    /// A text value does not match the field pattern.
    #[error("provided value '{value}' is not matching pattern /{pattern}/")]
    StringPatternMismatch {
        /// The rejected value.
        value: String,
        /// The pattern source.
        pattern: String,
    },
}

impl ValidationError {
    /// Creates a required field error.
    pub fn required(field: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field: field.into(),
        }
    }

    /// Creates an invalid field type error.
    pub fn invalid_type(expected: &'static str, field: impl Into<String>) -> Self {
        Self::InvalidFieldType {
            expected,
            field: field.into(),
        }
    }

    /// Returns the failure category.
    pub fn kind(&self) -> ValidationKind {
        match self {
            Self::RequiredFieldMissing { .. } => ValidationKind::Required,
            Self::InvalidFieldType { .. } => ValidationKind::Type,
            Self::NumberOutOfRange { .. } | Self::DateOutOfRange { .. } => ValidationKind::Range,
            Self::StringPatternMismatch { .. } => ValidationKind::Pattern,
        }
    }
}

fn bound<T: Display>(min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (Some(min), _) => format!("bigger than '{min}'"),
        (None, Some(max)) => format!("smaller than '{max}'"),
        (None, None) => "within range".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_messages_cite_the_violated_bound() {
        let low = ValidationError::NumberOutOfRange {
            value: 9.0,
            min: Some(10.0),
            max: None,
        };
        assert_eq!(low.to_string(), "provided value '9' must be bigger than '10'");

        let high = ValidationError::NumberOutOfRange {
            value: 101.0,
            min: None,
            max: Some(100.0),
        };
        assert_eq!(high.to_string(), "provided value '101' must be smaller than '100'");
    }

    #[test]
    fn kinds() {
        assert_eq!(ValidationError::required("name").kind(), ValidationKind::Required);
        assert_eq!(
            ValidationError::invalid_type("Email", "email").kind(),
            ValidationKind::Type
        );
        let pattern = ValidationError::StringPatternMismatch {
            value: "abc1".into(),
            pattern: "^[^0-9]+$".into(),
        };
        assert_eq!(pattern.kind(), ValidationKind::Pattern);
    }

    #[test]
    fn validation_converts_into_core_error() {
        let err: CoreError = ValidationError::required("name").into();
        assert_eq!(err.to_string(), "missing required field: 'name'");
        assert!(err.as_validation().is_some());
    }
}

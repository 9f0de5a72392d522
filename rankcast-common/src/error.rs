//! Common error types for rankcast

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::model::Category;

/// Common result type for rankcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// One offending location in an uploaded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (e.g. `/buckets/3/score`)
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Common error types across rankcast components
#[derive(Error, Debug)]
pub enum Error {
    /// Payload yielded zero usable buckets
    #[error("Bad dataset: no usable score buckets ({discarded} entries discarded)")]
    Normalization { discarded: usize },

    /// Uploaded payload failed shape/range validation
    #[error("Schema validation failed with {} violation(s)", .0.len())]
    SchemaValidation(Vec<SchemaViolation>),

    /// Neither the category nor the general dataset exists for the year
    #[error("No distribution found for year {year} ({category})")]
    DistributionNotFound { year: i32, category: Category },

    /// Resolved distribution has zero candidates
    #[error("Distribution for year {year} ({category}) has no candidates")]
    EmptyDistribution { year: i32, category: Category },

    /// Backing store failure (transient, retryable)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Normalization { .. } => "NormalizationError",
            Error::SchemaValidation(_) => "SchemaValidationError",
            Error::DistributionNotFound { .. } => "DistributionNotFound",
            Error::EmptyDistribution { .. } => "EmptyDistribution",
            Error::Store(_) | Error::Io(_) => "StoreError",
            #[cfg(feature = "sqlx")]
            Error::Database(_) => "StoreError",
            Error::Serialization(_) => "SerializationError",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Config(_) => "ConfigError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Backing-store failures may succeed on the next request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(_) | Error::Io(_) => true,
            #[cfg(feature = "sqlx")]
            Error::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        let errors = [
            Error::Normalization { discarded: 3 },
            Error::SchemaValidation(vec![]),
            Error::DistributionNotFound {
                year: 2024,
                category: Category::General,
            },
            Error::EmptyDistribution {
                year: 2024,
                category: Category::General,
            },
        ];
        for e in &errors {
            assert!(!e.is_retryable(), "{} should be terminal", e.kind());
        }
    }

    #[test]
    fn test_store_errors_are_retryable() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());
        assert_eq!(io.kind(), "StoreError");
        assert!(Error::Store("timeout".into()).is_retryable());
    }

    #[test]
    fn test_messages() {
        let e = Error::DistributionNotFound {
            year: 2023,
            category: Category::parse("obc").unwrap(),
        };
        assert_eq!(e.to_string(), "No distribution found for year 2023 (OBC)");

        let e = Error::Normalization { discarded: 7 };
        assert!(e.to_string().contains("7 entries discarded"));

        let v = SchemaViolation::new("/buckets/0/score", "must be <= 720");
        assert_eq!(v.to_string(), "/buckets/0/score: must be <= 720");
    }
}

//! Error types for table access and configuration.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while reading tables or validating configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("specified attribute {column} does not exist in the {table} table")]
    MissingColumn { table: &'static str, column: String },

    #[error("attribute {column} has no value for {row}")]
    MissingValue { column: String, row: String },

    #[error("specified attribute {column} must be numeric (found {found:?} for {row})")]
    NonNumeric {
        column: String,
        row: String,
        found: String,
    },

    #[error("duplicate site id: {0}")]
    DuplicateSite(String),

    #[error("invalid period {value} in attribute {column}: periods must be non-negative integers")]
    InvalidPeriod { column: String, value: f64 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl CoreError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

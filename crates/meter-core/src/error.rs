//! Error types for validation and engine-level failures.

use std::path::PathBuf;
use thiserror::Error;

/// A single reading record that could not be turned into a [`Reading`].
///
/// Validation errors are scoped to one meter: the pipelines quarantine the
/// offending meter and keep processing the rest.
///
/// [`Reading`]: crate::models::Reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The date string is not a `YYYY-MM-DD` calendar day.
    #[error("Invalid reading date for meter {meter_id}: {value:?}")]
    InvalidDate { meter_id: String, value: String },

    /// The reading value is not a finite number.
    #[error("Invalid reading value for meter {meter_id}: {value:?}")]
    InvalidValue { meter_id: String, value: String },

    /// The reading carries no value at all.
    #[error("Missing reading value for meter {meter_id} on {date}")]
    MissingValue { meter_id: String, date: String },
}

impl ValidationError {
    /// The meter the offending record belongs to.
    pub fn meter_id(&self) -> &str {
        match self {
            ValidationError::InvalidDate { meter_id, .. }
            | ValidationError::InvalidValue { meter_id, .. }
            | ValidationError::MissingValue { meter_id, .. } => meter_id,
        }
    }
}

/// All errors produced by the meter engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A snapshot or config file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A period bound given by the caller is not a valid date.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the engine crates.
pub type Result<T> = std::result::Result<T, EngineError>;

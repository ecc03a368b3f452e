//! Error types shared by the loader, the cascade and the configuration layer.

use serde::Serialize;
use thiserror::Error;

/// Why a row was excluded from the batch.
///
/// Every variant is row-local: the offending row is dropped and logged, the
/// rest of the batch keeps going.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("column '{column}' has non-numeric value '{value}'")]
    NotNumeric { column: String, value: String },

    #[error("column '{column}' is out of domain: {value}")]
    OutOfDomain { column: String, value: f64 },

    #[error("required column '{column}' is empty")]
    MissingField { column: String },

    #[error("store {op}/{toko} appears more than once")]
    DuplicateIdentity { op: String, toko: String },

    #[error("row could not be read: {message}")]
    Unreadable { message: String },
}

/// Rejected [`CascadeConfig`](crate::config::CascadeConfig) values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    NegativeThreshold { field: &'static str, value: f64 },

    #[error("km_tempuh.min_observations must be at least 1")]
    ZeroMinimumObservations,

    #[error("precision must be at most {max} decimals (got {value})")]
    PrecisionTooLarge { max: u32, value: u32 },

    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to read an input table at all. Individual bad rows never surface
/// here; they become [`RecordError`]s.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {dataset} at {path}")]
    Open {
        dataset: &'static str,
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{dataset} is missing required column '{column}'")]
    MissingColumn {
        dataset: &'static str,
        column: &'static str,
    },

    #[error("failed to read headers of {dataset}")]
    Headers {
        dataset: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// A row dropped from the batch, with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    /// Dataset and line (`operational:17`) or store identity (`PBPNR/T001`).
    pub origin: String,
    pub error: RecordError,
}

impl Exclusion {
    pub fn new(origin: impl Into<String>, error: RecordError) -> Self {
        Self {
            origin: origin.into(),
            error,
        }
    }
}

//! Error handling for the OS status monitor
//!
//! Fatal conditions abort a run and surface as [`MonitorError`]. Problems
//! that only affect a row or a batch are not errors: they are collected as
//! [`Diagnostic`](os_monitor_types::Diagnostic) values and returned to the
//! caller alongside the report.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for a consolidation run
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Target mapping unavailable at {path}: {reason}")]
    MissingTargetMapping { path: PathBuf, reason: String },

    #[error("Batch dated {batch_date} applied after batch dated {last_applied}; batches must be applied in increasing date order")]
    BatchOutOfOrder {
        batch_date: NaiveDate,
        last_applied: NaiveDate,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        MonitorError::Config {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type MonitorResult<T> = Result<T, MonitorError>;

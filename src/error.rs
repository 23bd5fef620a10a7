use std::path::PathBuf;
use thiserror::Error;

use crate::persistence::PersistenceError;

/// Errors raised by the preprocessing and training pipeline.
///
/// Data-quality problems (unknown labels, unparsable timestamps) are logged
/// and passed through; only configuration and IO failures surface here.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Window size {window} must be smaller than the series length {len}")]
    WindowTooLarge { window: usize, len: usize },
    #[error("Column '{0}' is not present in the table")]
    MissingColumn(String),
    #[error("Column '{0}' is not numeric")]
    NonNumericColumn(String),
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),
    #[error("Checkpoint error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Plotting failed: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

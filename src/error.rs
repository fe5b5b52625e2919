//! Error types for the ETL pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, validating, transforming or loading a file.
///
/// `Format`, `Validation` and `Parse` are fatal for the file that raised
/// them; database errors are fatal for the whole dataset run. Uniqueness
/// violations are not an error: the loader reports them in its `LoadResult`.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("unrecognised format for {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("batch for table {table} is missing required columns: {missing:?}")]
    Validation {
        table: &'static str,
        missing: Vec<String>,
    },

    #[error("row {row}: cannot parse {column}={value:?} as {expected}")]
    Parse {
        column: String,
        value: String,
        expected: &'static str,
        row: usize,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("download failed: {0}")]
    Connectivity(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

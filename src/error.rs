//! Error types for Glucoscope

use thiserror::Error;

/// Errors that can occur at the loading and encoding boundaries.
///
/// Per-row data problems (unparsable readings, events without a baseline)
/// are not errors; they are reported as values alongside the output.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

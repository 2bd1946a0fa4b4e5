//! Error types for the jet tagging pipeline

use thiserror::Error;

/// Result type alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading jets, building graphs or running models
#[derive(Error, Debug)]
pub enum Error {
    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Checkpoint (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Input data violates the expected layout
    #[error("Invalid data at line {line}: {message}")]
    InvalidData { line: usize, message: String },

    /// A jet contained nothing but padding
    #[error("Jet has no particles after padding removal")]
    EmptyJet,

    /// Nothing to train or evaluate on
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    /// Array dimensions do not line up
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Layer used out of order (e.g. backward without forward)
    #[error("Model error: {0}")]
    Model(String),

    /// Rejected configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

//! Error types for vigil-core

use thiserror::Error;

/// Result type alias using vigil-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vigil-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid retry policy or monitor configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

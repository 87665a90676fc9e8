//! Error types for Wiretap

use thiserror::Error;

/// Main error type for Wiretap operations
#[derive(Error, Debug)]
pub enum WiretapError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors (SQLite, migrations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Proxy/HTTP errors
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for WiretapError {
    fn from(e: rusqlite::Error) -> Self {
        WiretapError::Storage(e.to_string())
    }
}

/// Result type alias for Wiretap operations
pub type Result<T> = std::result::Result<T, WiretapError>;

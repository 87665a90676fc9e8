//! Error type for CLI commands.

use thiserror::Error;

use wiretap::WiretapError;

/// Failures a CLI command can hit, split by what the user can do about them.
#[derive(Error, Debug)]
pub enum CliError {
    /// The request made no sense (unknown session, bad filter value)
    #[error("{0}")]
    InvalidArgument(String),

    /// Nothing matched the query
    #[error("{0}")]
    NotFound(String),

    /// The capture database could not be opened or queried
    #[error("Database error: {0}")]
    Database(String),

    /// Rendering interactions as JSON/JSONL failed
    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    /// Reading or writing an output file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WiretapError> for CliError {
    fn from(e: WiretapError) -> Self {
        match e {
            WiretapError::Storage(msg) => CliError::Database(msg),
            WiretapError::Serialization(e) => CliError::Export(e),
            WiretapError::Io(e) => CliError::Io(e),
            WiretapError::Config(msg) => CliError::InvalidArgument(msg),
            other => CliError::Database(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_database() {
        let e: CliError = WiretapError::Storage("locked".to_string()).into();
        assert!(matches!(e, CliError::Database(_)));
        assert_eq!(e.to_string(), "Database error: locked");
    }

    #[test]
    fn test_io_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: CliError = io.into();
        assert!(matches!(e, CliError::Io(_)));
    }
}

//! Error types for Trainyard Core.

use thiserror::Error;
use trainyard_training::TrainingError;

/// Core error type for server and configuration operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Training errors
    #[error(transparent)]
    Training(#[from] TrainingError),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_address_parsing() {
        let parse_err = "not-an-address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: CoreError = parse_err.into();
        assert!(matches!(err, CoreError::InvalidAddress(_)));
        assert!(err.to_string().starts_with("Invalid address"));
    }

    #[test]
    fn test_core_error_training_is_transparent() {
        let err: CoreError = TrainingError::NotFound("run1".to_string()).into();
        assert_eq!(err.to_string(), TrainingError::NotFound("run1".to_string()).to_string());
    }
}

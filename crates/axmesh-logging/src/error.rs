//! Logging setup errors

use thiserror::Error;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid logging configuration: {0}")]
    Config(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

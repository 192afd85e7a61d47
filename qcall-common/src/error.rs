//! Common error types for qcall

use thiserror::Error;

/// Common result type for qcall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the qcall crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Push message did not match the expected wire shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid input value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

//! Error types for qcall-announcer
//!
//! Module-specific error type using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the announcer
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Push channel connect/read errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Push message did not match the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Announcement clip could not be fetched
    #[error("Clip fetch error: {0}")]
    Fetch(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback scheduling errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// HTTP client/server errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] qcall_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

/// Convenience Result type using the announcer Error
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the capture pipeline.

use thiserror::Error;

/// Main error type for a capture run. Only capture-side failures are
/// fatal; sink errors are logged and processing continues.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing the capture file.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to reading the capture source.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Invalid or unrecognized capture format.
    #[error("invalid capture format: {reason}")]
    InvalidFormat { reason: String },
}

/// Errors from a storage sink. Never fatal to the capture run.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Write to the backing store failed.
    #[error("write: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be encoded for storage.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for midigen.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client supplied a request the pipeline cannot start on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Audio decoding or WAV I/O error.
    #[error("audio: {0}")]
    Audio(String),

    /// MIDI container read/write error.
    #[error("midi: {0}")]
    Midi(String),

    /// The external completion command failed.
    #[error("completion: {0}")]
    Completion(String),

    /// The persisted output file is missing after the write stage.
    #[error("output file missing after write: {}", .0.display())]
    MissingOutput(PathBuf),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}

impl From<midly::Error> for Error {
    fn from(error: midly::Error) -> Self {
        Error::Midi(error.to_string())
    }
}

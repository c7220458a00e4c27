//! Error types for the extraction and load paths

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that fail a whole source path for one run.
///
/// A missing player count is not an error; it is recorded as `None` on the
/// record and never reaches this type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Token exchange against the Twitch identity endpoint failed
    #[error("Twitch auth failed (status {status:?}): {message}")]
    Auth { status: Option<u16>, message: String },

    /// Batched stream query returned a non-success status
    #[error("Upstream request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Write to the object store failed
    #[error("Upload to '{path}' failed: {message}")]
    Upload { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure on a call whose errors propagate
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    pub fn auth(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Auth { status, message: message.into() }
    }

    pub fn upload(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upload { path: path.into(), message: message.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

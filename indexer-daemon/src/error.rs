//! Error types for indexer-daemon
//!
//! Failures are handled per file: nothing here ever terminates the daemon.
//! - `UploadError`: one remote call failed (transport, non-2xx, bad payload)
//! - `IngestError`: one file's pipeline run failed, and at which step
//! - `WatchError`: the directory watcher could not start or reported a fault

use std::path::PathBuf;
use thiserror::Error;

/// Remote ingestion API call error
#[derive(Debug, Error)]
pub enum UploadError {
    /// Connection refused, DNS failure, broken stream...
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-2xx response
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// 2xx response whose body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Local file could not be opened for streaming
    #[error("File access error: {0}")]
    Io(#[from] std::io::Error),

    /// Endpoint URL cannot address an upload
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl UploadError {
    /// HTTP status, when the failure came from a remote response
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a later identical attempt could plausibly succeed
    ///
    /// The upload chain retries every failure regardless; this only feeds logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) | UploadError::Timeout(_) => true,
            UploadError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            UploadError::Parse(_) | UploadError::Io(_) | UploadError::InvalidEndpoint(_) => false,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout(err.to_string())
        } else if err.is_decode() {
            UploadError::Parse(err.to_string())
        } else {
            UploadError::Network(err.to_string())
        }
    }
}

/// Per-file pipeline failure
#[derive(Debug, Error)]
pub enum IngestError {
    /// Filesystem metadata could not be read
    #[error("Failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata registration failed; never retried
    #[error("Registration failed: {0}")]
    Registration(#[source] UploadError),

    /// Body upload failed on every attempt
    #[error("Upload of {id} failed after {attempts} attempt(s): {source}")]
    UploadFailed {
        id: String,
        attempts: u32,
        #[source]
        source: UploadError,
    },

    /// The task running this file was cancelled
    #[error("Processing cancelled")]
    Cancelled,
}

impl IngestError {
    /// Remote failure behind this error, if any
    pub fn upload_error(&self) -> Option<&UploadError> {
        match self {
            IngestError::Registration(e) | IngestError::UploadFailed { source: e, .. } => Some(e),
            IngestError::Stat { .. } | IngestError::Cancelled => None,
        }
    }
}

/// Directory watcher error
#[derive(Debug, Error)]
pub enum WatchError {
    /// Root directory does not exist
    #[error("Path not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Root path exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Error from the OS notification backend
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Error while scanning the tree
    #[error("Scan error: {0}")]
    Scan(String),
}

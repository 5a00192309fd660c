//! Error types for the extractor module.

use thiserror::Error;

use crate::classifier::{classify, ErrorKind};

/// Errors that can occur while probing or fetching.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// yt-dlp binary not found.
    #[error("yt-dlp not found at path: {path}")]
    BinaryNotFound { path: String },

    /// The extractor process reported a failure.
    #[error("{message}")]
    Failed { message: String },

    /// Probe did not finish in time.
    #[error("Extraction timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Output could not be understood.
    #[error("Failed to parse extractor output: {reason}")]
    ParseError { reason: String },

    /// The URL resolved to a single item where a playlist was expected.
    #[error("URL is not a playlist")]
    NotAPlaylist,

    /// Process finished but left no media behind.
    #[error("Extractor produced no output file")]
    NoOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Classification used by the retry pipeline.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed { message } => classify(message),
            Self::Timeout { .. } => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }
}

//! Error types for the transcoder module.

use std::path::PathBuf;
use thiserror::Error;

use crate::classifier::ErrorKind;

/// Errors that can occur during transcoding.
#[derive(Debug, Error)]
pub enum TranscoderError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: String },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// FFmpeg ran but did not produce the output.
    #[error("Transcoding failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// Transcoding timed out.
    #[error("Transcoding timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error during transcoding.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscoderError {
    /// Creates a failed error with captured stderr.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Retry classification. Only timeouts carry a structured reason.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }

    /// Message including captured stderr when available.
    pub fn detail(&self) -> String {
        match self {
            Self::Failed {
                reason,
                stderr: Some(stderr),
            } => format!("{}: {}", reason, stderr.trim()),
            other => other.to_string(),
        }
    }
}

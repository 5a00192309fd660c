//! Mock transcoder for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::transcoder::{TranscodeJob, Transcoder, TranscoderError};

/// Mock implementation of the Transcoder trait.
///
/// Writes a small placeholder file at the job's output path and records
/// every job it was given.
#[derive(Debug)]
pub struct MockTranscoder {
    jobs: Arc<RwLock<Vec<TranscodeJob>>>,
    /// If set, the next conversion fails with this error.
    next_error: Arc<RwLock<Option<TranscoderError>>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all recorded jobs.
    pub async fn recorded_jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.read().await.clone()
    }

    /// Configure the next conversion to fail with the given error.
    pub async fn set_next_error(&self, error: TranscoderError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(&self, job: TranscodeJob) -> Result<PathBuf, TranscoderError> {
        self.jobs.write().await.push(job.clone());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&job.output, b"mock output").await?;
        Ok(job.output)
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        Ok(())
    }
}

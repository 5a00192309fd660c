//! Trait definition for the transcoder module.

use async_trait::async_trait;
use std::path::PathBuf;

use super::error::TranscoderError;
use super::types::TranscodeJob;

/// Converts a fetched artifact into the final output file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Runs the job and returns the path of the written output.
    ///
    /// Dropping the returned future must stop any spawned process.
    async fn convert(&self, job: TranscodeJob) -> Result<PathBuf, TranscoderError>;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), TranscoderError>;
}

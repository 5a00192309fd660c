//! Trait definition for the extractor module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::ExtractorError;
use super::types::{Artifact, Metadata, PlaylistInfo, ProgressEvent};
use crate::strategy::ResolvedOptions;

/// Source of media metadata and content.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the name of this extractor implementation.
    fn name(&self) -> &str;

    /// Fetch metadata without transferring media.
    async fn probe(&self, url: &str, options: &ResolvedOptions) -> Result<Metadata, ExtractorError>;

    /// Transfer media into `dest_dir`.
    ///
    /// Progress events are sent best-effort; a full or closed channel never
    /// fails the fetch. Dropping the future must stop any spawned process.
    async fn fetch(
        &self,
        url: &str,
        options: &ResolvedOptions,
        dest_dir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<Artifact, ExtractorError>;

    /// Flat listing of a playlist, at most `limit` entries.
    async fn playlist(&self, url: &str, limit: usize) -> Result<PlaylistInfo, ExtractorError>;
}

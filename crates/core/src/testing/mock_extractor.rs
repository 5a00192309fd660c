//! Mock extractor for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::extractor::{
    Artifact, Extractor, ExtractorError, Metadata, PlaylistInfo, ProgressEvent,
};
use crate::strategy::ResolvedOptions;

/// What one fetch call does.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Write a file into the destination and succeed.
    Success,
    /// Fail with `ExtractorError::Failed` carrying this message.
    Fail(String),
    /// Never finish. Only a timeout or cancellation ends the call.
    Hang,
}

impl MockOutcome {
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A recorded fetch call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub url: String,
    pub options: ResolvedOptions,
}

/// Mock implementation of the Extractor trait.
///
/// Provides controllable behavior for testing:
/// - Scripted per-URL outcomes, consumed one per fetch attempt
/// - Simulated fetch duration
/// - Tracking of concurrent fetches
/// - Recorded calls
#[derive(Debug)]
pub struct MockExtractor {
    /// Remaining outcomes by URL. An empty script means success.
    scripts: Arc<RwLock<HashMap<String, VecDeque<MockOutcome>>>>,
    /// Recorded fetch calls.
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    /// Simulated fetch duration.
    fetch_duration: Arc<RwLock<Duration>>,
    /// Playlist returned by `playlist`.
    playlist: Arc<RwLock<Option<PlaylistInfo>>>,
    /// If set, the next probe or playlist call fails with this message.
    next_error: Arc<RwLock<Option<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the active counter even when the fetch future is dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
            fetch_duration: Arc::new(RwLock::new(Duration::from_millis(10))),
            playlist: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script the outcomes of successive fetches of `url`.
    pub async fn script(&self, url: &str, outcomes: Vec<MockOutcome>) {
        self.scripts
            .write()
            .await
            .insert(url.to_string(), outcomes.into());
    }

    /// Set the simulated fetch duration.
    pub async fn set_fetch_duration(&self, duration: Duration) {
        *self.fetch_duration.write().await = duration;
    }

    pub async fn set_playlist(&self, playlist: PlaylistInfo) {
        *self.playlist.write().await = Some(playlist);
    }

    /// Configure the next probe or playlist call to fail.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    /// Get all recorded fetches.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Fetch attempts made for `url`.
    pub async fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .read()
            .await
            .iter()
            .filter(|f| f.url == url)
            .count()
    }

    /// Highest number of fetches that were in progress at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn next_outcome(&self, url: &str) -> MockOutcome {
        self.scripts
            .write()
            .await
            .get_mut(url)
            .and_then(|s| s.pop_front())
            .unwrap_or(MockOutcome::Success)
    }

    async fn take_error(&self) -> Option<ExtractorError> {
        self.next_error.write().await.take().map(ExtractorError::failed)
    }

    /// Item id used for the fetched file: last path segment of the URL.
    fn item_id(url: &str) -> String {
        let tail = url
            .rsplit(['/', '=', '?'])
            .find(|s| !s.is_empty())
            .unwrap_or("item");
        tail.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, url: &str, _options: &ResolvedOptions) -> Result<Metadata, ExtractorError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let id = Self::item_id(url);
        Ok(Metadata {
            title: format!("Mock {}", id),
            uploader: Some("Mock Uploader".to_string()),
            duration: Some(180.0),
            webpage_url: Some(url.to_string()),
            id,
            ..Metadata::default()
        })
    }

    async fn fetch(
        &self,
        url: &str,
        options: &ResolvedOptions,
        dest_dir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<Artifact, ExtractorError> {
        self.fetches.write().await.push(RecordedFetch {
            url: url.to_string(),
            options: options.clone(),
        });

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));

        let outcome = self.next_outcome(url).await;
        let duration = *self.fetch_duration.read().await;

        let _ = progress.try_send(ProgressEvent::downloading(512, Some(1024)));
        tokio::time::sleep(duration).await;

        match outcome {
            MockOutcome::Success => {}
            MockOutcome::Fail(message) => return Err(ExtractorError::failed(message)),
            MockOutcome::Hang => std::future::pending::<()>().await,
        }

        let _ = progress.try_send(ProgressEvent::downloading(1024, Some(1024)));
        let _ = progress.try_send(ProgressEvent::processing());

        let id = Self::item_id(url);
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("{}.webm", id));
        tokio::fs::write(&path, b"mock media").await?;
        let thumbnail = dest_dir.join(format!("{}.jpg", id));
        tokio::fs::write(&thumbnail, b"mock thumbnail").await?;

        Ok(Artifact::single(
            path,
            Metadata {
                title: format!("Mock {}", id),
                uploader: Some("Mock Uploader".to_string()),
                webpage_url: Some(url.to_string()),
                id,
                ..Metadata::default()
            },
        )
        .with_thumbnail(thumbnail))
    }

    async fn playlist(&self, _url: &str, limit: usize) -> Result<PlaylistInfo, ExtractorError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let mut playlist = self
            .playlist
            .read()
            .await
            .clone()
            .ok_or(ExtractorError::NotAPlaylist)?;
        playlist.entries.truncate(limit);
        Ok(playlist)
    }
}

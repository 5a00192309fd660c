//! Multi-strategy retry pipeline run for each job.
//!
//! One pipeline run walks the strategy catalog in order. Each attempt
//! resolves fresh options, fetches through the extractor into a private work
//! directory and transcodes the result into the downloads directory. Failures
//! are classified to decide between backing off, moving on, or giving up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier::ErrorKind;
use crate::config::{Config, RetryConfig};
use crate::extractor::{Artifact, Extractor, ExtractorError, ProgressEvent, ProgressPhase};
use crate::history::{HistoryEntry, HistoryStore};
use crate::job::{AuthSource, DownloadRequest, Job, JobError, JobRegistry, JobStatus};
use crate::ledger::{LedgerRecord, LedgerStore};
use crate::metrics;
use crate::notify::NotificationHub;
use crate::strategy::{resolve, ResolvedOptions, StrategyCatalog};
use crate::transcoder::{AudioFilters, Tags, TranscodeJob, Transcoder, TranscoderError};

/// Progress events buffered between the extractor and the job.
const PROGRESS_BUFFER: usize = 32;

/// Longest file stem written to the downloads directory.
const MAX_STEM_LEN: usize = 180;

/// Highest `(n)` suffix tried before giving up on a file name.
const MAX_NAME_SUFFIX: u32 = 10_000;

/// Settings the pipeline needs out of the full configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub catalog: StrategyCatalog,
    pub retry: RetryConfig,
    pub downloads_dir: PathBuf,
    /// Server-wide cookie file used when a request brings no auth.
    pub cookies_file: PathBuf,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            catalog: StrategyCatalog::from_config(config.strategies.as_deref()),
            retry: config.retry.clone(),
            downloads_dir: config.extractor.downloads_dir.clone(),
            cookies_file: config.extractor.cookies_file.clone(),
        }
    }

    /// Cookie file to fall back on, if present and non-empty.
    pub fn fallback_auth(&self) -> Option<AuthSource> {
        std::fs::metadata(&self.cookies_file)
            .is_ok_and(|m| m.is_file() && m.len() > 0)
            .then(|| AuthSource::CookieFile(self.cookies_file.clone()))
    }
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Extract(#[from] ExtractorError),

    #[error("{}", .0.detail())]
    Transcode(TranscoderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job went terminal underneath us (cancelled).
    #[error(transparent)]
    Aborted(#[from] JobError),
}

impl AttemptError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Extract(e) => e.kind(),
            Self::Transcode(e) => e.kind(),
            Self::Io(_) => ErrorKind::Unknown,
            Self::Aborted(_) => ErrorKind::Cancelled,
        }
    }
}

/// One finished output file.
#[derive(Debug, Clone)]
struct Output {
    path: PathBuf,
    title: String,
    artist: Option<String>,
    thumbnail: Option<String>,
}

/// Runs jobs through the strategy catalog.
pub struct RetryPipeline {
    config: PipelineConfig,
    registry: Arc<JobRegistry>,
    hub: Arc<NotificationHub>,
    ledger: Arc<dyn LedgerStore>,
    history: Arc<dyn HistoryStore>,
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
}

impl RetryPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<JobRegistry>,
        hub: Arc<NotificationHub>,
        ledger: Arc<dyn LedgerStore>,
        history: Arc<dyn HistoryStore>,
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            config,
            registry,
            hub,
            ledger,
            history,
            extractor,
            transcoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Drive `job_id` to a terminal status and return the final snapshot.
    ///
    /// Returns `JobError::Terminal` when the job was finished by someone else
    /// (cancellation) while the pipeline was still running.
    pub async fn run(&self, job_id: &str, request: &DownloadRequest) -> Result<Job, JobError> {
        let trim = match request.trim() {
            Ok(trim) => trim,
            Err(e) => return self.fail_job(job_id, request, JobStatus::Error, &e.to_string()),
        };

        let fallback_auth = self.config.fallback_auth();
        let total = self.config.catalog.len();
        let mut last_error: Option<String> = None;

        for (attempt, strategy) in self.config.catalog.iter() {
            let Some(options) = resolve(attempt, strategy, request, trim, fallback_auth.as_ref())
            else {
                debug!(job_id = %job_id, strategy = %strategy.name, "Skipping strategy, no auth source");
                metrics::STRATEGY_ATTEMPTS
                    .with_label_values(&[strategy.name.as_str(), "skipped"])
                    .inc();
                continue;
            };

            let job = self
                .registry
                .mutate(job_id, |j| j.begin_attempt(attempt, &options.strategy))?;
            self.hub.publish(&job);
            info!(job_id = %job_id, attempt, strategy = %options.strategy, "Starting attempt");

            let work_dir = self.work_dir(job_id).join(format!("attempt-{}", attempt));
            let result = self.attempt(job_id, request, &options, &work_dir).await;

            let error = match result {
                Ok(outputs) => {
                    self.cleanup(job_id).await;
                    metrics::STRATEGY_ATTEMPTS
                        .with_label_values(&[options.strategy.as_str(), "success"])
                        .inc();
                    return self.finish_success(job_id, request, outputs);
                }
                Err(AttemptError::Aborted(e)) => {
                    self.cleanup(job_id).await;
                    return Err(e);
                }
                Err(e) => e,
            };

            let kind = error.kind();
            let message = error.to_string();
            metrics::STRATEGY_ATTEMPTS
                .with_label_values(&[options.strategy.as_str(), "failure"])
                .inc();
            metrics::FAILURES_BY_KIND
                .with_label_values(&[kind.as_str()])
                .inc();
            warn!(
                job_id = %job_id,
                attempt,
                strategy = %options.strategy,
                kind = kind.as_str(),
                error = %message,
                "Attempt failed"
            );

            let is_last = attempt as usize >= total;
            match kind {
                ErrorKind::AuthRequired => {
                    self.cleanup(job_id).await;
                    let message = format!(
                        "authentication required: re-authenticate (upload fresh cookies or pick a browser) and retry. {}",
                        message
                    );
                    return self.fail_job(job_id, request, JobStatus::Error, &message);
                }
                ErrorKind::Transient if !is_last => {
                    let delay = self.config.retry.transient_backoff_ms * attempt as u64;
                    debug!(job_id = %job_id, delay_ms = delay, "Backing off");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                ErrorKind::FormatUnavailable => {}
                _ if !is_last => {
                    tokio::time::sleep(Duration::from_millis(self.config.retry.unknown_delay_ms))
                        .await;
                }
                _ => {}
            }
            last_error = Some(message);
        }

        self.cleanup(job_id).await;
        let message = match last_error {
            Some(e) => format!("all methods failed: {}", e),
            None => "all methods failed: every strategy requires authentication".to_string(),
        };
        self.fail_job(job_id, request, JobStatus::Error, &message)
    }

    /// Move the job to a terminal failure status and record it everywhere.
    pub fn fail_job(
        &self,
        job_id: &str,
        request: &DownloadRequest,
        status: JobStatus,
        message: &str,
    ) -> Result<Job, JobError> {
        let job = self.registry.mutate(job_id, |j| j.fail(status, message))?;
        self.hub.publish(&job);
        info!(job_id = %job_id, status = %status, error = %message, "Job failed");

        if let Some(batch) = request.batch() {
            let title = job.title.clone().unwrap_or_else(|| request.url.clone());
            let mut record = LedgerRecord::failed(
                &batch.batch_id,
                &batch.item_id,
                title,
                &request.url,
                job.error.as_deref().unwrap_or(message),
            );
            if let Ok(json) = serde_json::to_string(request) {
                record = record.with_request(json);
            }
            if let Err(e) = self.ledger.upsert(&record) {
                warn!(job_id = %job_id, error = %e, "Failed to write ledger record");
            }
        }

        record_finished(&job);
        Ok(job)
    }

    /// Remove the job's work directory.
    pub async fn cleanup(&self, job_id: &str) {
        let dir = self.work_dir(job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(job_id = %job_id, error = %e, "Failed to remove work directory");
            }
        }
    }

    fn work_dir(&self, job_id: &str) -> PathBuf {
        self.config.downloads_dir.join(".work").join(job_id)
    }

    async fn attempt(
        &self,
        job_id: &str,
        request: &DownloadRequest,
        options: &ResolvedOptions,
        work_dir: &Path,
    ) -> Result<Vec<Output>, AttemptError> {
        let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
        let fetch = self.extractor.fetch(&request.url, options, work_dir, tx);
        tokio::pin!(fetch);

        let artifact = loop {
            tokio::select! {
                result = &mut fetch => break result?,
                Some(event) = rx.recv() => self.apply_progress(job_id, event)?,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_progress(job_id, event)?;
        }

        let job = self.registry.mutate(job_id, |j| {
            let current = j.progress;
            j.advance(JobStatus::Processing, current)
        })?;
        self.hub.publish(&job);

        tokio::fs::create_dir_all(&self.config.downloads_dir).await?;
        self.transcode_all(job_id, request, options, &artifact).await
    }

    async fn transcode_all(
        &self,
        job_id: &str,
        request: &DownloadRequest,
        options: &ResolvedOptions,
        artifact: &Artifact,
    ) -> Result<Vec<Output>, AttemptError> {
        let mut outputs = Vec::with_capacity(artifact.files.len());

        for file in &artifact.files {
            let meta = artifact.metadata_for(file);
            let title = request
                .title
                .clone()
                .or_else(|| meta.map(|m| m.title.clone()).filter(|t| !t.is_empty()))
                .or_else(|| file.file_stem().map(|s| s.to_string_lossy().to_string()))
                .unwrap_or_else(|| "download".to_string());
            let artist = request
                .artist
                .clone()
                .or_else(|| meta.and_then(|m| m.artist.clone().or_else(|| m.uploader.clone())));

            let reservation = reserve_output_path(
                &self.config.downloads_dir,
                &sanitize_filename(&title),
                options.target.extension(),
            )
            .await?;

            let job = TranscodeJob {
                job_id: job_id.to_string(),
                input: file.clone(),
                output: reservation.path().to_path_buf(),
                target: options.target,
                filters: AudioFilters::from_request(request),
                tags: Tags {
                    title: Some(title.clone()),
                    artist: artist.clone(),
                },
                cover: if options.target.is_audio() {
                    request
                        .cover_path
                        .clone()
                        .or_else(|| artifact.thumbnail_for(file).cloned())
                } else {
                    None
                },
            };

            let path = match self.transcoder.convert(job).await {
                Ok(path) => {
                    metrics::TRANSCODES_TOTAL.with_label_values(&["success"]).inc();
                    if path == reservation.path() {
                        reservation.keep();
                    }
                    path
                }
                Err(e) => {
                    metrics::TRANSCODES_TOTAL.with_label_values(&["failure"]).inc();
                    return Err(AttemptError::Transcode(e));
                }
            };

            outputs.push(Output {
                path,
                title,
                artist,
                thumbnail: meta.and_then(|m| m.thumbnail.clone()),
            });
        }

        Ok(outputs)
    }

    fn apply_progress(&self, job_id: &str, event: ProgressEvent) -> Result<(), JobError> {
        let job = self.registry.mutate(job_id, |j| {
            let current = j.progress;
            match event.phase {
                ProgressPhase::Downloading => {
                    j.advance(JobStatus::Downloading, event.percent().unwrap_or(current))
                }
                ProgressPhase::Processing => j.advance(JobStatus::Processing, current),
            }
        })?;
        debug!(job_id = %job_id, status = %job.status, progress = job.progress, "Progress");
        self.hub.publish(&job);
        Ok(())
    }

    fn finish_success(
        &self,
        job_id: &str,
        request: &DownloadRequest,
        outputs: Vec<Output>,
    ) -> Result<Job, JobError> {
        let Some(first) = outputs.first() else {
            return self.fail_job(job_id, request, JobStatus::Error, "no output produced");
        };
        let filename = file_name(&first.path);

        // Persist first so anyone observing `done` finds ledger and history current.
        if let Some(batch) = request.batch() {
            let mut record = LedgerRecord::downloaded(
                &batch.batch_id,
                &batch.item_id,
                &first.title,
                first.path.to_string_lossy(),
                &request.url,
            );
            if let Ok(json) = serde_json::to_string(request) {
                record = record.with_request(json);
            }
            if let Err(e) = self.ledger.upsert(&record) {
                warn!(job_id = %job_id, error = %e, "Failed to write ledger record");
            }
        }

        for output in &outputs {
            let entry = HistoryEntry {
                title: output.title.clone(),
                artist: output.artist.clone(),
                thumbnail: output.thumbnail.clone(),
                file: file_name(&output.path),
                quality: request.quality.clone(),
                mode: request.mode,
                original_url: request.url.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.history.add(&entry) {
                warn!(job_id = %job_id, error = %e, "Failed to record history");
            }
        }

        let job = self
            .registry
            .mutate(job_id, |j| j.complete(filename.clone(), Some(first.title.clone())))?;
        self.hub.publish(&job);
        info!(job_id = %job_id, filename = %filename, files = outputs.len(), "Job done");

        record_finished(&job);
        Ok(job)
    }
}

fn record_finished(job: &Job) {
    let outcome = job.status.to_string();
    metrics::JOBS_FINISHED.with_label_values(&[outcome.as_str()]).inc();
    if let Some(started) = job.started_at {
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::JOB_DURATION
            .with_label_values(&[outcome.as_str()])
            .observe(elapsed);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Make a title safe to use as a file stem.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_LEN)
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// An output path claimed in the downloads directory.
///
/// The claim is an empty placeholder created with `create_new`, so two jobs
/// can never pick the same name. Dropping an unkept reservation removes the
/// placeholder, which also covers attempts aborted mid-transcode.
struct Reservation {
    path: PathBuf,
    kept: bool,
}

impl Reservation {
    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.kept {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Claim `dir/stem.ext`, or `dir/stem (n).ext` when that is taken.
async fn reserve_output_path(
    dir: &Path,
    stem: &str,
    extension: &str,
) -> std::io::Result<Reservation> {
    for n in 0..MAX_NAME_SUFFIX {
        let path = if n == 0 {
            dir.join(format!("{}.{}", stem, extension))
        } else {
            dir.join(format!("{} ({}).{}", stem, n, extension))
        };
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok(Reservation { path, kept: false }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name for {}.{}", stem, extension),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("AC/DC: Back in Black"), "AC_DC_ Back in Black");
        assert_eq!(sanitize_filename("  ..  "), "download");
        assert_eq!(sanitize_filename("What?"), "What_");
        assert_eq!(sanitize_filename(&"x".repeat(400)).len(), MAX_STEM_LEN);
    }

    #[tokio::test]
    async fn test_reserve_output_path_claims_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = reserve_output_path(dir.path(), "Song", "mp3").await.unwrap();
        let second = reserve_output_path(dir.path(), "Song", "mp3").await.unwrap();
        assert_eq!(first.path(), dir.path().join("Song.mp3"));
        assert_eq!(second.path(), dir.path().join("Song (1).mp3"));
        assert!(first.path().exists());

        first.keep();
        drop(second);
        assert!(dir.path().join("Song.mp3").exists());
        assert!(!dir.path().join("Song (1).mp3").exists());

        let third = reserve_output_path(dir.path(), "Song", "mp3").await.unwrap();
        assert_eq!(third.path(), dir.path().join("Song (1).mp3"));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let claims = reserve_concurrently(dir.path()).await;
        let mut paths: Vec<PathBuf> = claims.iter().map(|r| r.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), claims.len());
    }

    async fn reserve_concurrently(dir: &Path) -> Vec<Reservation> {
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.to_path_buf();
                tokio::spawn(async move { reserve_output_path(&dir, "Intro", "m4a").await })
            })
            .collect();
        let mut claims = Vec::new();
        for task in tasks {
            claims.push(task.await.unwrap().unwrap());
        }
        claims
    }

    #[test]
    fn test_fallback_auth_requires_content() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        let mut config = PipelineConfig::from_config(&Config::default());
        config.cookies_file = cookies.clone();
        assert!(config.fallback_auth().is_none());

        std::fs::write(&cookies, "").unwrap();
        assert!(config.fallback_auth().is_none());

        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        assert_eq!(config.fallback_auth(), Some(AuthSource::CookieFile(cookies)));
    }
}

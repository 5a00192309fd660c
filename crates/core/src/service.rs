//! Job API used by the HTTP layer.
//!
//! Wires the registry, notification hub, retry pipeline and worker pool
//! together and exposes the operations handlers need.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::extractor::{Extractor, ExtractorError, Metadata, PlaylistEntry, PlaylistInfo};
use crate::history::HistoryStore;
use crate::job::{BatchRef, DownloadRequest, Job, JobError, JobRegistry, RequestError};
use crate::ledger::{BatchItemState, ItemAnnotation, LedgerError, LedgerRecord, LedgerStore};
use crate::metrics;
use crate::notify::NotificationHub;
use crate::strategy::resolve;
use crate::transcoder::Transcoder;
use crate::worker::{PipelineConfig, PoolError, PoolStatus, RetryPipeline, WorkerPool};

/// Error type for job service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    #[error("Stored request for {batch_id}/{item_id} is unreadable: {reason}")]
    CorruptRequest {
        batch_id: String,
        item_id: String,
        reason: String,
    },
}

/// External collaborators the service is built on.
pub struct ServiceDeps {
    pub ledger: Arc<dyn LedgerStore>,
    pub history: Arc<dyn HistoryStore>,
    pub extractor: Arc<dyn Extractor>,
    pub transcoder: Arc<dyn Transcoder>,
}

/// One item of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub item_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    pub item_id: String,
    pub job_id: String,
}

/// Result of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEnqueued {
    pub queued: Vec<QueuedItem>,
    /// Items skipped because the ledger already has them downloaded.
    pub skipped: Vec<String>,
    /// Items skipped because a job for them is still queued or running.
    #[serde(default)]
    pub in_progress: Vec<String>,
}

/// Playlist entry annotated with its ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(flatten)]
    pub entry: PlaylistEntry,
    pub state: BatchItemState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub playlist_id: String,
    /// Ledger batch the annotations were read from.
    pub batch_id: String,
    pub title: String,
    pub uploader: String,
    pub total_videos: usize,
    pub videos: Vec<PlaylistItem>,
}

pub struct JobService {
    registry: Arc<JobRegistry>,
    hub: Arc<NotificationHub>,
    pipeline: Arc<RetryPipeline>,
    pool: WorkerPool,
    ledger: Arc<dyn LedgerStore>,
    extractor: Arc<dyn Extractor>,
}

impl JobService {
    /// Build the service. Workers are not running until [`JobService::start`].
    pub fn new(config: &Config, deps: ServiceDeps) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let hub = Arc::new(NotificationHub::new(Arc::clone(&registry)));
        let pipeline = Arc::new(RetryPipeline::new(
            PipelineConfig::from_config(config),
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::clone(&deps.ledger),
            deps.history,
            Arc::clone(&deps.extractor),
            deps.transcoder,
        ));
        let pool = WorkerPool::new(
            config.workers.clone(),
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::clone(&pipeline),
        );

        Self {
            registry,
            hub,
            pipeline,
            pool,
            ledger: deps.ledger,
            extractor: deps.extractor,
        }
    }

    pub fn start(&self) {
        self.pool.start();
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Validate and queue a request, returning the new job id.
    pub fn enqueue(&self, request: DownloadRequest) -> Result<String, ServiceError> {
        request.validate()?;

        let job_id = self.registry.create(&request);
        match self.pool.submit(&job_id, request.clone()) {
            Ok(()) => {}
            Err(e @ PoolError::ItemActive { .. }) => {
                self.registry.remove(&job_id);
                return Err(e.into());
            }
            Err(e) => {
                let _ = self.pipeline.fail_job(
                    &job_id,
                    &request,
                    crate::job::JobStatus::Error,
                    &e.to_string(),
                );
                return Err(e.into());
            }
        }

        metrics::JOBS_ENQUEUED.inc();
        info!(job_id = %job_id, url = %request.url, mode = ?request.mode, "Job enqueued");
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<Job, ServiceError> {
        Ok(self.registry.get(job_id)?)
    }

    pub fn list_all(&self) -> HashMap<String, Job> {
        self.hub.snapshot_all()
    }

    pub fn cancel(&self, job_id: &str) -> Result<Job, ServiceError> {
        Ok(self.pool.cancel(job_id)?)
    }

    /// Re-run a batch item from its stored request.
    ///
    /// The ledger record is marked `missing` first so the item reads as
    /// pending while the new job runs. Fails with `PoolError::ItemActive`
    /// while another job still holds the item.
    pub fn retry(&self, batch_id: &str, item_id: &str) -> Result<String, ServiceError> {
        let record = self
            .ledger
            .get(batch_id, item_id)?
            .ok_or_else(|| LedgerError::not_found(batch_id, item_id))?;

        let item = BatchRef {
            batch_id: batch_id.to_string(),
            item_id: item_id.to_string(),
        };
        if let Some(job_id) = self.pool.active_job(&item) {
            return Err(PoolError::ItemActive {
                batch_id: item.batch_id,
                item_id: item.item_id,
                job_id,
            }
            .into());
        }

        let request = match &record.request {
            Some(json) => serde_json::from_str::<DownloadRequest>(json).map_err(|e| {
                ServiceError::CorruptRequest {
                    batch_id: batch_id.to_string(),
                    item_id: item_id.to_string(),
                    reason: e.to_string(),
                }
            })?,
            None => {
                let mut request = DownloadRequest::new(&record.url);
                request.title = Some(record.title.clone()).filter(|t| !t.is_empty());
                request
            }
        }
        .with_batch(batch_id, item_id);

        self.ledger.mark_missing(batch_id, item_id)?;
        info!(batch_id = %batch_id, item_id = %item_id, "Retrying batch item");
        self.enqueue(request)
    }

    /// Queue every item of a batch, built from `template`.
    pub fn enqueue_batch(
        &self,
        batch_id: &str,
        items: Vec<BatchItem>,
        template: &DownloadRequest,
        skip_downloaded: bool,
    ) -> Result<BatchEnqueued, ServiceError> {
        let downloaded = if skip_downloaded {
            self.ledger.downloaded_ids(batch_id)?
        } else {
            Default::default()
        };

        let mut result = BatchEnqueued::default();
        for item in items {
            if downloaded.contains(&item.item_id) {
                result.skipped.push(item.item_id);
                continue;
            }
            let item_ref = BatchRef {
                batch_id: batch_id.to_string(),
                item_id: item.item_id.clone(),
            };
            if self.pool.active_job(&item_ref).is_some() {
                result.in_progress.push(item.item_id);
                continue;
            }

            let mut request = template.clone().with_batch(batch_id, &item.item_id);
            request.url = item.url;
            request.playlist = false;
            if item.title.is_some() {
                request.title = item.title;
            }

            let job_id = match self.enqueue(request) {
                Ok(job_id) => job_id,
                Err(ServiceError::Pool(PoolError::ItemActive { .. })) => {
                    result.in_progress.push(item.item_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            result.queued.push(QueuedItem {
                item_id: item.item_id,
                job_id,
            });
        }

        info!(
            batch_id = %batch_id,
            queued = result.queued.len(),
            skipped = result.skipped.len(),
            in_progress = result.in_progress.len(),
            "Batch enqueued"
        );
        Ok(result)
    }

    /// Annotate `item_ids` as downloaded or pending, preserving order.
    pub fn batch_details(
        &self,
        batch_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<ItemAnnotation>, ServiceError> {
        let downloaded = self.ledger.downloaded_ids(batch_id)?;
        Ok(item_ids
            .iter()
            .map(|id| ItemAnnotation {
                item_id: id.clone(),
                state: if downloaded.contains(id) {
                    BatchItemState::Downloaded
                } else {
                    BatchItemState::Pending
                },
            })
            .collect())
    }

    /// Every ledger record of a batch, newest first.
    pub fn batch_records(&self, batch_id: &str) -> Result<Vec<LedgerRecord>, ServiceError> {
        Ok(self.ledger.list(batch_id)?)
    }

    pub fn clear_batch(&self, batch_id: &str) -> Result<usize, ServiceError> {
        Ok(self.ledger.clear_batch(batch_id)?)
    }

    /// List a playlist and mark which entries the ledger already has.
    ///
    /// Annotations come from `batch_id`, defaulting to the playlist id.
    pub async fn playlist_details(
        &self,
        url: &str,
        limit: usize,
        batch_id: Option<&str>,
    ) -> Result<PlaylistDetails, ServiceError> {
        let PlaylistInfo {
            id,
            title,
            uploader,
            entries,
        } = self.extractor.playlist(url, limit).await?;

        let batch_id = batch_id
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let annotations = self.batch_details(&batch_id, &ids)?;

        let videos: Vec<PlaylistItem> = entries
            .into_iter()
            .zip(annotations)
            .map(|(entry, annotation)| PlaylistItem {
                entry,
                state: annotation.state,
            })
            .collect();

        Ok(PlaylistDetails {
            playlist_id: id,
            batch_id,
            title,
            uploader,
            total_videos: videos.len(),
            videos,
        })
    }

    /// Metadata for `url`, trying strategies in catalog order.
    pub async fn probe(&self, url: &str) -> Result<Metadata, ServiceError> {
        let request = DownloadRequest::new(url);
        request.validate()?;

        let config = self.pipeline.config();
        let fallback_auth = config.fallback_auth();
        let mut last_error = None;

        for (attempt, strategy) in config.catalog.iter() {
            let Some(options) = resolve(attempt, strategy, &request, None, fallback_auth.as_ref())
            else {
                continue;
            };
            match self.extractor.probe(url, &options).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => {
                    warn!(url = %url, strategy = %options.strategy, error = %e, "Probe failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ExtractorError::failed("no strategy could be applied"))
            .into())
    }
}

//! Bounded worker pool fed by a FIFO queue.
//!
//! `W` long-lived workers share one queue. Each dequeued job runs its
//! pipeline on a separately spawned task that the worker awaits under the
//! job deadline; on expiry the task is aborted and the job marked `timeout`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use super::pipeline::RetryPipeline;
use crate::config::WorkerConfig;
use crate::job::{BatchRef, DownloadRequest, Job, JobError, JobRegistry, JobStatus};
use crate::notify::NotificationHub;

/// Error type for pool operations.
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Item {batch_id}/{item_id} is already being downloaded by job {job_id}")]
    ItemActive {
        batch_id: String,
        item_id: String,
        job_id: String,
    },
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub running: bool,
    pub workers: usize,
    /// Jobs waiting for a worker.
    pub queued: usize,
    /// Jobs currently held by a worker.
    pub in_flight: usize,
}

/// A job waiting for or held by a worker.
struct Entry {
    request: DownloadRequest,
    /// Set once a worker has spawned the pipeline task.
    abort: Option<AbortHandle>,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

struct Queued {
    job_id: String,
    request: DownloadRequest,
}

/// Everything a worker task needs.
#[derive(Clone)]
struct WorkerContext {
    registry: Arc<JobRegistry>,
    hub: Arc<NotificationHub>,
    pipeline: Arc<RetryPipeline>,
    entries: Entries,
    job_timeout: Duration,
}

pub struct WorkerPool {
    config: WorkerConfig,
    context: WorkerContext,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<Queued>>>,
    queue_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Queued>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        registry: Arc<JobRegistry>,
        hub: Arc<NotificationHub>,
        pipeline: Arc<RetryPipeline>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            context: WorkerContext {
                registry,
                hub,
                pipeline,
                entries: Arc::new(Mutex::new(HashMap::new())),
                job_timeout: Duration::from_secs(config.job_timeout_secs),
            },
            config,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers and the janitor.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(
            workers = self.config.max_concurrent,
            job_timeout_secs = self.config.job_timeout_secs,
            "Starting worker pool"
        );

        let mut handles = lock(&self.handles);
        for worker_id in 0..self.config.max_concurrent {
            handles.push(self.spawn_worker(worker_id));
        }
        handles.push(self.spawn_janitor());
    }

    /// Queue a job already registered under `job_id`.
    ///
    /// Publishes the queued snapshot. A batch item is held by at most one
    /// queued or running job; a second submission for the same item fails
    /// with `PoolError::ItemActive` and publishes nothing.
    pub fn submit(&self, job_id: &str, request: DownloadRequest) -> Result<(), PoolError> {
        let queue = lock(&self.queue_tx);
        let tx = queue.as_ref().ok_or(PoolError::ShutDown)?;

        {
            let mut entries = lock(&self.context.entries);
            if let Some(batch) = request.batch() {
                if let Some(holder) = holder_of(&entries, &batch) {
                    return Err(PoolError::ItemActive {
                        batch_id: batch.batch_id,
                        item_id: batch.item_id,
                        job_id: holder,
                    });
                }
            }
            entries.insert(
                job_id.to_string(),
                Entry {
                    request: request.clone(),
                    abort: None,
                },
            );
        }

        // Announce `queued` before any worker can publish `running`.
        if let Ok(job) = self.context.registry.get(job_id) {
            self.context.hub.publish(&job);
        }

        tx.send(Queued {
            job_id: job_id.to_string(),
            request,
        })
        .map_err(|_| {
            lock(&self.context.entries).remove(job_id);
            PoolError::ShutDown
        })?;

        debug!(job_id = %job_id, "Job queued");
        Ok(())
    }

    /// Job currently queued or running for a batch item.
    pub fn active_job(&self, batch: &BatchRef) -> Option<String> {
        holder_of(&lock(&self.context.entries), batch)
    }

    /// Cancel a queued or in-flight job.
    pub fn cancel(&self, job_id: &str) -> Result<Job, JobError> {
        let (request, abort) = {
            let entries = lock(&self.context.entries);
            match entries.get(job_id) {
                Some(entry) => (entry.request.clone(), entry.abort.clone()),
                None => {
                    // Unknown to the pool: either finished or never existed.
                    let job = self.context.registry.get(job_id)?;
                    return Err(JobError::Terminal {
                        job_id: job_id.to_string(),
                        status: job.status,
                    });
                }
            }
        };

        let job = self.context.pipeline.fail_job(
            job_id,
            &request,
            JobStatus::Cancelled,
            "cancelled by user",
        )?;

        match abort {
            Some(abort) => abort.abort(),
            // Not picked up yet: release the item now, the worker skips it later.
            None => {
                lock(&self.context.entries).remove(job_id);
            }
        }
        info!(job_id = %job_id, "Job cancelled");
        Ok(job)
    }

    pub fn status(&self) -> PoolStatus {
        let entries = lock(&self.context.entries);
        let in_flight = entries.values().filter(|e| e.abort.is_some()).count();
        PoolStatus {
            running: self.running.load(Ordering::Relaxed),
            workers: self.config.max_concurrent,
            queued: entries.len() - in_flight,
            in_flight,
        }
    }

    /// Close the queue, cancel outstanding jobs and wait for workers to exit.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");
        lock(&self.queue_tx).take();
        let _ = self.shutdown_tx.send(());

        let outstanding: Vec<String> = lock(&self.context.entries).keys().cloned().collect();
        for job_id in outstanding {
            let pending = lock(&self.context.entries)
                .get(&job_id)
                .map(|e| (e.request.clone(), e.abort.clone()));
            if let Some((request, abort)) = pending {
                let _ = self.context.pipeline.fail_job(
                    &job_id,
                    &request,
                    JobStatus::Cancelled,
                    "cancelled: server shutting down",
                );
                if let Some(abort) = abort {
                    abort.abort();
                }
            }
        }

        let handles: Vec<JoinHandle<()>> = lock(&self.handles).drain(..).collect();
        for handle in handles {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("Worker did not stop in time");
            }
        }

        info!("Worker pool stopped");
    }

    fn spawn_worker(&self, worker_id: usize) -> JoinHandle<()> {
        let context = self.context.clone();
        let queue = Arc::clone(&self.queue_rx);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker_id, "Worker started");

            while running.load(Ordering::SeqCst) {
                let next = tokio::select! {
                    _ = shutdown_rx.recv() => None,
                    next = async { queue.lock().await.recv().await } => next,
                };

                let Some(queued) = next else {
                    break;
                };

                context.process(worker_id, queued).await;
            }

            debug!(worker_id, "Worker stopped");
        })
    }

    fn spawn_janitor(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.context.registry);
        let interval = Duration::from_secs(self.config.janitor_interval_secs.max(1));
        let retention = chrono::Duration::seconds(self.config.retention_secs as i64);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let pruned = registry.prune_finished(retention);
                        if pruned > 0 {
                            debug!(pruned, "Pruned finished jobs");
                        }
                    }
                }
            }
        })
    }
}

impl WorkerContext {
    async fn process(&self, worker_id: usize, queued: Queued) {
        let Queued { job_id, request } = queued;

        let job = match self.registry.mutate(&job_id, |j| j.start()) {
            Ok(job) => job,
            Err(e) => {
                // Cancelled while queued.
                debug!(worker_id, job_id = %job_id, error = %e, "Skipping job");
                lock(&self.entries).remove(&job_id);
                return;
            }
        };
        self.hub.publish(&job);
        info!(worker_id, job_id = %job_id, url = %request.url, "Job started");

        let mut handle = {
            let pipeline = Arc::clone(&self.pipeline);
            let job_id = job_id.clone();
            let request = request.clone();
            tokio::spawn(async move { pipeline.run(&job_id, &request).await })
        };
        if let Some(entry) = lock(&self.entries).get_mut(&job_id) {
            entry.abort = Some(handle.abort_handle());
        }

        match tokio::time::timeout(self.job_timeout, &mut handle).await {
            Ok(Ok(Ok(job))) => {
                debug!(worker_id, job_id = %job_id, status = %job.status, "Pipeline finished");
            }
            Ok(Ok(Err(e))) => {
                debug!(worker_id, job_id = %job_id, error = %e, "Pipeline stopped");
            }
            Ok(Err(e)) if e.is_cancelled() => {
                debug!(worker_id, job_id = %job_id, "Pipeline aborted");
                self.pipeline.cleanup(&job_id).await;
            }
            Ok(Err(e)) => {
                error!(worker_id, job_id = %job_id, error = %e, "Pipeline task panicked");
                let _ = self.pipeline.fail_job(
                    &job_id,
                    &request,
                    JobStatus::Error,
                    "internal error: pipeline task panicked",
                );
                self.pipeline.cleanup(&job_id).await;
            }
            Err(_) => {
                handle.abort();
                let secs = self.job_timeout.as_secs();
                warn!(worker_id, job_id = %job_id, timeout_secs = secs, "Job deadline exceeded");
                let _ = self.pipeline.fail_job(
                    &job_id,
                    &request,
                    JobStatus::Timeout,
                    &format!("job exceeded the {}s deadline and was stopped", secs),
                );
                // Let the aborted task unwind so its subprocesses are dropped.
                let _ = handle.await;
                self.pipeline.cleanup(&job_id).await;
            }
        }

        lock(&self.entries).remove(&job_id);
    }
}

fn holder_of(entries: &HashMap<String, Entry>, batch: &BatchRef) -> Option<String> {
    entries
        .iter()
        .find(|(_, entry)| entry.request.batch().as_ref() == Some(batch))
        .map(|(job_id, _)| job_id.clone())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::job::{Job, JobError, JobRegistry};

/// Per-job subscriber queue depth.
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Capacity of the all-jobs broadcast channel.
pub const BROADCAST_CAPACITY: usize = 256;

/// Pushes job snapshots to per-job subscribers and to the all-jobs stream.
///
/// Publishing never blocks: a subscriber whose queue is full misses that
/// snapshot, and one whose receiver is gone is dropped. Per-job senders are
/// released once a terminal snapshot has been published, which closes the
/// receiving end.
pub struct NotificationHub {
    registry: Arc<JobRegistry>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Job>>>>,
    global: broadcast::Sender<Job>,
}

impl NotificationHub {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        let (global, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            registry,
            subscribers: Mutex::new(HashMap::new()),
            global,
        }
    }

    pub fn publish(&self, job: &Job) {
        // Err only means nobody is listening.
        let _ = self.global.send(job.clone());

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(senders) = subscribers.get_mut(&job.id) else {
            return;
        };

        senders.retain(|tx| match tx.try_send(job.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(job_id = %job.id, "Subscriber queue full, snapshot skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if senders.is_empty() || job.status.is_terminal() {
            subscribers.remove(&job.id);
        }
    }

    /// Current snapshot of `job_id` plus a receiver for every later one.
    ///
    /// For a job that is already terminal the receiver is closed from the start.
    pub fn subscribe(&self, job_id: &str) -> Result<(Job, mpsc::Receiver<Job>), JobError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Holding the subscriber lock while reading the snapshot means no
        // publish can fall between the two.
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.registry.get(job_id)?;

        if !snapshot.status.is_terminal() {
            subscribers.entry(job_id.to_string()).or_default().push(tx);
        }

        Ok((snapshot, rx))
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Job> {
        self.global.subscribe()
    }

    /// Pull-mode view of every job.
    pub fn snapshot_all(&self) -> HashMap<String, Job> {
        self.registry.list()
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .map_or(0, Vec::len)
    }
}

//! In-memory job table shared by workers, handlers and the notification hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::request::DownloadRequest;
use super::types::{Job, JobStatus};

/// Error type for registry operations.
#[derive(Debug, Error, PartialEq)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is already {status}")]
    Terminal { job_id: String, status: JobStatus },
}

/// Table of live jobs.
///
/// The outer map lock is only held to look up or insert entries; each job
/// sits behind its own mutex so the owning worker and concurrent readers
/// never contend on unrelated jobs. Readers always receive cloned snapshots.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queued job for `request` and return its id.
    pub fn create(&self, request: &DownloadRequest) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), request);
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::new(Mutex::new(job)));
        debug!(job_id = %id, url = %request.url, "Job registered");
        id
    }

    /// Snapshot of one job.
    pub fn get(&self, job_id: &str) -> Result<Job, JobError> {
        let entry = self.entry(job_id)?;
        let job = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(job.clone())
    }

    /// Snapshots of all jobs keyed by id.
    pub fn list(&self) -> HashMap<String, Job> {
        let entries: Vec<(String, Arc<Mutex<Job>>)> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        entries
            .into_iter()
            .map(|(id, entry)| {
                let job = entry.lock().unwrap_or_else(PoisonError::into_inner).clone();
                (id, job)
            })
            .collect()
    }

    /// Apply `f` to the job atomically and return the resulting snapshot.
    ///
    /// Terminal jobs are frozen: the closure is not run and
    /// `JobError::Terminal` is returned.
    pub fn mutate<F>(&self, job_id: &str, f: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job),
    {
        let entry = self.entry(job_id)?;
        let mut job = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if job.status.is_terminal() {
            return Err(JobError::Terminal {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        f(&mut job);
        Ok(job.clone())
    }

    /// Forget a job that was never handed to a worker.
    pub fn remove(&self, job_id: &str) -> Option<Job> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
            .map(|entry| entry.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Drop terminal jobs that finished more than `retention` ago.
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let job = entry.lock().unwrap_or_else(PoisonError::into_inner);
            !(job.status.is_terminal() && job.finished_at.is_some_and(|t| t < cutoff))
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, job_id: &str) -> Result<Arc<Mutex<Job>>, JobError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn request() -> DownloadRequest {
        DownloadRequest::new("https://example.com/watch?v=1")
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let id = registry.create(&request());
        let job = registry.get(&id).unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
    }

    #[test]
    fn test_get_unknown_job() {
        let registry = JobRegistry::new();
        assert_eq!(
            registry.get("nope"),
            Err(JobError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.create(&request()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn test_mutate_returns_snapshot() {
        let registry = JobRegistry::new();
        let id = registry.create(&request());
        let job = registry
            .mutate(&id, |job| {
                job.start();
                job.begin_attempt(1, "web");
                job.advance(JobStatus::Downloading, 12.5);
            })
            .unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(registry.get(&id).unwrap(), job);
    }

    #[test]
    fn test_terminal_jobs_are_frozen() {
        let registry = JobRegistry::new();
        let id = registry.create(&request());
        registry
            .mutate(&id, |job| job.fail(JobStatus::Cancelled, "cancelled by user"))
            .unwrap();

        let result = registry.mutate(&id, |job| job.start());
        assert_eq!(
            result,
            Err(JobError::Terminal {
                job_id: id.clone(),
                status: JobStatus::Cancelled
            })
        );
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_list_and_remove() {
        let registry = JobRegistry::new();
        let a = registry.create(&request());
        let b = registry.create(&request());
        registry.mutate(&a, |job| job.start()).unwrap();

        let all = registry.list();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&a].status, JobStatus::Running);

        let removed = registry.remove(&b).unwrap();
        assert_eq!(removed.status, JobStatus::Queued);
        assert!(registry.remove(&b).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prune_finished() {
        let registry = JobRegistry::new();
        let old = registry.create(&request());
        let fresh = registry.create(&request());
        let queued = registry.create(&request());

        registry
            .mutate(&old, |job| {
                job.fail(JobStatus::Error, "boom");
                job.finished_at = Some(Utc::now() - Duration::hours(2));
            })
            .unwrap();
        registry
            .mutate(&fresh, |job| job.complete("a.mp3".to_string(), None))
            .unwrap();

        assert_eq!(registry.prune_finished(Duration::hours(1)), 1);
        assert!(registry.get(&old).is_err());
        assert!(registry.get(&fresh).is_ok());
        assert!(registry.get(&queued).is_ok());
    }
}

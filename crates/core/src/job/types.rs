//! Job state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::{BatchRef, DownloadRequest, MediaMode};

/// Lifecycle status of a job.
///
/// Serialized as a flat string (`"queued"`, `"retry_method_3"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Downloading,
    Processing,
    /// Strategy N (N >= 2) is being attempted after a recoverable failure.
    RetryMethod(u32),
    Done,
    Error,
    Timeout,
    Cancelled,
}

impl JobStatus {
    /// Returns true if the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Error | JobStatus::Timeout | JobStatus::Cancelled
        )
    }

    /// Returns true for the superstate in which a worker holds the job.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Running
                | JobStatus::Downloading
                | JobStatus::Processing
                | JobStatus::RetryMethod(_)
        )
    }

    /// Status name without the strategy number.
    pub fn state_type(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::RetryMethod(_) => "retry_method",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::RetryMethod(n) => write!(f, "retry_method_{}", n),
            other => f.write_str(other.state_type()),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "downloading" => JobStatus::Downloading,
            "processing" => JobStatus::Processing,
            "done" => JobStatus::Done,
            "error" => JobStatus::Error,
            "timeout" => JobStatus::Timeout,
            "cancelled" => JobStatus::Cancelled,
            other => {
                let n = other
                    .strip_prefix("retry_method_")
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| format!("unknown job status: {}", other))?;
                JobStatus::RetryMethod(n)
            }
        };
        Ok(status)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Snapshot of one acquisition job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Percentage of the current attempt, 0-100.
    pub progress: f64,
    /// 1-based strategy attempt, 0 while queued.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub url: String,
    pub mode: MediaMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchRef>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Fresh queued job for a request.
    pub fn new(id: impl Into<String>, request: &DownloadRequest) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            attempt: 0,
            strategy: None,
            url: request.url.clone(),
            mode: request.mode,
            title: request.title.clone(),
            filename: None,
            error: None,
            batch: request.batch(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Worker claimed the job.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Begin strategy attempt `attempt` (1-based). Progress restarts at 0.
    pub fn begin_attempt(&mut self, attempt: u32, strategy: &str) {
        self.attempt = attempt;
        self.strategy = Some(strategy.to_string());
        self.progress = 0.0;
        self.status = if attempt <= 1 {
            JobStatus::Running
        } else {
            JobStatus::RetryMethod(attempt)
        };
    }

    /// Move to `status` and raise progress. Progress never goes backwards
    /// within an attempt.
    pub fn advance(&mut self, status: JobStatus, progress: f64) {
        self.status = status;
        let progress = progress.clamp(0.0, 100.0);
        if progress > self.progress {
            self.progress = progress;
        }
    }

    /// Successful completion.
    pub fn complete(&mut self, filename: String, title: Option<String>) {
        self.advance(JobStatus::Processing, 100.0);
        self.filename = Some(filename);
        if title.is_some() {
            self.title = title;
        }
        self.error = None;
        self.status = JobStatus::Done;
        self.finished_at = Some(Utc::now());
    }

    /// Terminal failure. `status` must be a terminal failure status.
    pub fn fail(&mut self, status: JobStatus, error: impl Into<String>) {
        debug_assert!(status.is_terminal() && status != JobStatus::Done);
        let error = error.into();
        self.error = Some(if error.trim().is_empty() {
            format!("job ended with status {}", status)
        } else {
            error
        });
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("job-1", &DownloadRequest::new("https://example.com/v"))
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(JobStatus::RetryMethod(3).to_string(), "retry_method_3");
        assert_eq!(
            serde_json::to_string(&JobStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        let parsed: JobStatus = serde_json::from_str("\"retry_method_2\"").unwrap();
        assert_eq!(parsed, JobStatus::RetryMethod(2));
        assert!("retry_method_x".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_from_owned_string() {
        assert_eq!(
            JobStatus::try_from("error".to_string()),
            Ok(JobStatus::Error)
        );
        assert_eq!(
            JobStatus::try_from("retry_method_4".to_string()),
            Ok(JobStatus::RetryMethod(4))
        );
        assert_eq!(String::from(JobStatus::Timeout), "timeout");
        assert!(JobStatus::try_from("stalled".to_string()).is_err());
    }

    #[test]
    fn test_terminal_and_active() {
        for status in [
            JobStatus::Done,
            JobStatus::Error,
            JobStatus::Timeout,
            JobStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
        assert!(JobStatus::RetryMethod(2).is_active());
        assert!(!JobStatus::Queued.is_active());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_progress_is_monotonic_within_attempt() {
        let mut job = job();
        job.start();
        job.begin_attempt(1, "web");
        job.advance(JobStatus::Downloading, 40.0);
        job.advance(JobStatus::Downloading, 25.0);
        assert_eq!(job.progress, 40.0);
        job.advance(JobStatus::Processing, 150.0);
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn test_new_attempt_resets_progress() {
        let mut job = job();
        job.begin_attempt(1, "web");
        job.advance(JobStatus::Downloading, 70.0);
        job.begin_attempt(2, "tv");
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.status, JobStatus::RetryMethod(2));
        assert_eq!(job.strategy.as_deref(), Some("tv"));
    }

    #[test]
    fn test_fail_always_has_message() {
        let mut job = job();
        job.fail(JobStatus::Cancelled, "");
        assert_eq!(job.error.as_deref(), Some("job ended with status cancelled"));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_complete_clears_error() {
        let mut job = job();
        job.error = Some("HTTP Error 429".to_string());
        job.complete("song.mp3".to_string(), Some("Song".to_string()));
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100.0);
        assert!(job.error.is_none());
        assert_eq!(job.title.as_deref(), Some("Song"));
    }
}

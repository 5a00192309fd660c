//! Jobs: requests, the status state machine and the in-memory registry.

mod registry;
mod request;
mod types;

pub use registry::{JobError, JobRegistry};
pub use request::{
    parse_time, AuthSource, BatchRef, DownloadRequest, MediaMode, RequestError, TimeRange,
};
pub use types::{Job, JobStatus};

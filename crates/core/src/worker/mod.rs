//! Job execution: the bounded worker pool and the retry pipeline it runs.

mod pipeline;
mod pool;

pub use pipeline::{sanitize_filename, PipelineConfig, RetryPipeline};
pub use pool::{PoolError, PoolStatus, WorkerPool};

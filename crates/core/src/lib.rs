pub mod classifier;
pub mod config;
pub mod extractor;
pub mod history;
pub mod job;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod service;
pub mod settings;
pub mod strategy;
pub mod testing;
pub mod transcoder;
pub mod worker;

pub use classifier::{classify, ErrorKind};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use extractor::{Extractor, ExtractorError, YtDlpExtractor};
pub use history::{HistoryEntry, HistoryStore, SqliteHistoryStore};
pub use job::{DownloadRequest, Job, JobError, JobRegistry, JobStatus, MediaMode};
pub use ledger::{LedgerError, LedgerRecord, LedgerStatus, LedgerStore, SqliteLedgerStore};
pub use notify::NotificationHub;
pub use service::{JobService, ServiceDeps, ServiceError};
pub use settings::{Presets, SettingsStore, SqliteSettingsStore};
pub use strategy::{StrategyCatalog, StrategyDescriptor};
pub use transcoder::{FfmpegTranscoder, Transcoder, TranscoderError};
pub use worker::{RetryPipeline, WorkerPool};

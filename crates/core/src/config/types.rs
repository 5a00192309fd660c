use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::strategy::StrategyDescriptor;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    /// Overrides the built-in strategy catalog when present.
    #[serde(default)]
    pub strategies: Option<Vec<StrategyDescriptor>>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8000
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("yoink.db")
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of workers, which is also the concurrency bound.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Deadline for a single job's whole pipeline.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// How often finished jobs are swept from the registry.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
    /// How long a finished job stays visible.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            job_timeout_secs: default_job_timeout_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_janitor_interval_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    3600
}

/// Backoff policy between strategy attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Transient failures wait `transient_backoff_ms * attempt`.
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,
    /// Fixed wait after an unclassified failure.
    #[serde(default = "default_unknown_delay_ms")]
    pub unknown_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_backoff_ms: default_transient_backoff_ms(),
            unknown_delay_ms: default_unknown_delay_ms(),
        }
    }
}

fn default_transient_backoff_ms() -> u64 {
    2000
}

fn default_unknown_delay_ms() -> u64 {
    1000
}

/// yt-dlp extractor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Where fetched media lands.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    /// Netscape cookie file used when a request brings no auth of its own.
    #[serde(default = "default_cookies_file")]
    pub cookies_file: PathBuf,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            downloads_dir: default_downloads_dir(),
            cookies_file: default_cookies_file(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_cookies_file() -> PathBuf {
    PathBuf::from("cookies.txt")
}

fn default_probe_timeout_secs() -> u64 {
    60
}

/// ffmpeg transcoder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_transcode_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ffmpeg_log_level")]
    pub log_level: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_transcode_timeout_secs(),
            log_level: default_ffmpeg_log_level(),
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_transcode_timeout_secs() -> u64 {
    600
}

fn default_ffmpeg_log_level() -> String {
    "error".to_string()
}

/// Config view for API responses (filesystem details of secrets hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub workers: WorkerConfig,
    pub retry: RetryConfig,
    pub extractor: SanitizedExtractorConfig,
    pub transcoder: TranscoderConfig,
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedExtractorConfig {
    pub ytdlp_path: String,
    pub downloads_dir: PathBuf,
    pub cookies_configured: bool,
    pub probe_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let strategies = match &config.strategies {
            Some(list) => list.iter().map(|s| s.name.clone()).collect(),
            None => crate::strategy::StrategyCatalog::default()
                .iter()
                .map(|(_, s)| s.name.clone())
                .collect(),
        };

        Self {
            server: config.server.clone(),
            workers: config.workers.clone(),
            retry: config.retry.clone(),
            extractor: SanitizedExtractorConfig {
                ytdlp_path: config.extractor.ytdlp_path.clone(),
                downloads_dir: config.extractor.downloads_dir.clone(),
                cookies_configured: config.extractor.cookies_file.is_file(),
                probe_timeout_secs: config.extractor.probe_timeout_secs,
            },
            transcoder: config.transcoder.clone(),
            strategies,
        }
    }
}

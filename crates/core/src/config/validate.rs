use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pool has at least one worker and a non-zero deadline
/// - Tool paths are set
/// - A strategy override is non-empty with unique names
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.workers.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "workers.max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.workers.job_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "workers.job_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.extractor.ytdlp_path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "extractor.ytdlp_path cannot be empty".to_string(),
        ));
    }

    if config.transcoder.ffmpeg_path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "transcoder.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    if let Some(strategies) = &config.strategies {
        if strategies.is_empty() {
            return Err(ConfigError::ValidationError(
                "strategies cannot be an empty list".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for strategy in strategies {
            if !seen.insert(strategy.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate strategy name '{}'",
                    strategy.name
                )));
            }
        }
    }

    Ok(())
}

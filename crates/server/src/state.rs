use std::path::Path;
use std::sync::Arc;
use yoink_core::{Config, HistoryStore, JobService, Presets, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<JobService>,
    history: Arc<dyn HistoryStore>,
    presets: Presets,
}

impl AppState {
    pub fn new(
        config: Config,
        service: Arc<JobService>,
        history: Arc<dyn HistoryStore>,
        presets: Presets,
    ) -> Self {
        Self {
            config,
            service,
            history,
            presets,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn service(&self) -> &JobService {
        self.service.as_ref()
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    /// Cookie file handed to strategies that need authentication.
    pub fn cookies_file(&self) -> &Path {
        &self.config.extractor.cookies_file
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.config.extractor.downloads_dir
    }

    pub fn cors_allowed_origins(&self) -> &[String] {
        &self.config.server.cors_allowed_origins
    }
}

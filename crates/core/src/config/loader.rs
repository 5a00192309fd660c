use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "YOINK_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys use a double underscore, e.g. `YOINK_WORKERS__MAX_CONCURRENT=8`.
/// Relative filesystem paths are resolved against the config file's directory
/// so the server behaves the same regardless of its working directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let mut config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if let Some(base) = path.parent() {
        resolve_paths(&mut config, base);
    }
    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn resolve_paths(config: &mut Config, base: &Path) {
    for path in [
        &mut config.database.path,
        &mut config.extractor.downloads_dir,
        &mut config.extractor.cookies_file,
    ] {
        *path = resolve(base, path);
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

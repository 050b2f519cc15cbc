use super::{ConfigError, Settings, ValidationOptions};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "UPDAGENT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/updagent/config.yaml";

/// Explicit path first, then `UPDAGENT_CONFIG`, then the system default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let settings = Settings::from_path(path)?;
    settings.validate(ValidationOptions::default())?;
    Ok(settings)
}

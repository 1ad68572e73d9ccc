pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod serve;

use std::path::Path;
use touchline_config::{AppConfig, ConfigError};

/// Load from `path` if given, otherwise the default location. Environment
/// overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return AppConfig::load();
    };
    let mut config = AppConfig::load_from(path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

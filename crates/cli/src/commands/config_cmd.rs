//! `touchline config` — Print the effective configuration.

use std::path::Path;
use touchline_config::AppConfig;

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let source = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("# {}", source.display());
    println!("{}", config.to_redacted_toml());
    Ok(())
}

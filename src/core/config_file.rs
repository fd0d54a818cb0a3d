use crate::constants;
use crate::models::host_config::HostConfig;
use crate::util::fs as host_fs;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load and validate the config file. A missing file yields the built-in defaults.
pub fn load(path: &Path) -> Result<HostConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(HostConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: HostConfig = toml::from_str(&content)
        .with_context(|| format!("parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validate config {}", path.display()))?;
    Ok(config)
}

pub fn save(path: &Path, config: &HostConfig) -> Result<()> {
    let content = toml::to_string_pretty(config).context("serialize config")?;
    host_fs::write_atomic(path, content.as_bytes(), constants::CONFIG_FILE_MODE)
        .with_context(|| format!("write config {}", path.display()))
}

use crate::models::config::InstanceConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load the config file; a missing file yields the defaults.
pub fn load(path: &Path) -> Result<InstanceConfig> {
    if !path.exists() {
        return Ok(InstanceConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse(&content).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse(content: &str) -> Result<InstanceConfig> {
    Ok(toml::from_str(content)?)
}

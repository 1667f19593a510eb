use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub assets_dir: Option<String>,
    pub metrics_port: Option<u16>,
    pub http_timeout_sec: Option<u64>,

    pub import: Option<ImportFileConfig>,
    /// Seed values for the settings store, applied only to unset keys.
    pub settings: HashMap<String, toml::Value>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImportFileConfig {
    pub batch_size: Option<usize>,
    pub failure_threshold: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

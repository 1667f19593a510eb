mod file_config;

pub use file_config::{FileConfig, ImportFileConfig};

use crate::import::ImportConfig;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub http_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Downloaded set icons live under `<assets_dir>/sets`.
    pub assets_dir: PathBuf,
    pub metrics_port: u16,
    pub http_timeout_sec: u64,
    pub import: ImportConfig,
    /// Seed values for the settings store, rendered as strings.
    pub settings: HashMap<String, String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let assets_dir = file
            .assets_dir
            .map(PathBuf::from)
            .or_else(|| cli.assets_dir.clone())
            .unwrap_or_else(|| db_dir.join("assets"));

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let http_timeout_sec = file.http_timeout_sec.unwrap_or(cli.http_timeout_sec);
        if http_timeout_sec == 0 {
            bail!("http_timeout_sec must be greater than 0");
        }

        let import_file = file.import.unwrap_or_default();
        let defaults = ImportConfig::default();
        let import = ImportConfig {
            batch_size: import_file.batch_size.unwrap_or(defaults.batch_size),
            failure_threshold: import_file
                .failure_threshold
                .unwrap_or(defaults.failure_threshold),
            http_timeout: Duration::from_secs(http_timeout_sec),
        };
        if import.batch_size == 0 {
            bail!("import.batch_size must be greater than 0");
        }
        if !(0.0..=1.0).contains(&import.failure_threshold) {
            bail!(
                "import.failure_threshold must be between 0 and 1, got {}",
                import.failure_threshold
            );
        }

        let settings = file
            .settings
            .into_iter()
            .map(|(key, value)| (key, setting_value(value)))
            .collect();

        Ok(Self {
            db_dir,
            assets_dir,
            metrics_port,
            http_timeout_sec,
            import,
            settings,
        })
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }
}

/// Settings are stored as text; strings are taken verbatim, anything else
/// in its TOML rendering.
fn setting_value(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }
}

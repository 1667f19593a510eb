//! Typed key-value settings.
//!
//! Stores only implement raw string access; the defaulting accessors are
//! provided on the trait so every caller reads settings the same way.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

pub mod keys {
    pub const JOB_CLEANUP_RETENTION_DAYS: &str = "job_cleanup_retention_days";
    pub const JOB_CLEANUP_LAST_RUN: &str = "job_cleanup_last_run";
    pub const SCHEDULER_CHECK_INTERVAL_MINUTES: &str = "scheduler_check_interval_minutes";
    pub const SCHEDULER_CATCHUP_ENABLED: &str = "scheduler_catchup_enabled";
    pub const SCHEDULER_CATCHUP_DELAY_SECONDS: &str = "scheduler_catchup_delay_seconds";

    pub fn auto_update(dataset: &str) -> String {
        format!("{}_auto_update", dataset)
    }

    pub fn update_time(dataset: &str) -> String {
        format!("{}_update_time", dataset)
    }

    pub fn last_update(dataset: &str) -> String {
        format!("{}_last_update", dataset)
    }

    pub fn last_update_status(dataset: &str) -> String {
        format!("{}_last_update_status", dataset)
    }

    pub fn url(dataset: &str) -> String {
        format!("{}_url", dataset)
    }

    pub fn dataset_type(dataset: &str) -> String {
        format!("{}_dataset_type", dataset)
    }
}

/// Built-in values written on first start for keys the operator has not set.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("card_data_auto_update", "true"),
    ("card_data_update_time", "03:00"),
    ("card_data_url", "https://api.scryfall.com/bulk-data"),
    ("card_data_dataset_type", "default_cards"),
    ("set_data_auto_update", "true"),
    ("set_data_update_time", "04:00"),
    ("set_data_url", "https://api.scryfall.com/bulk-data"),
    ("set_data_dataset_type", "sets"),
    (keys::JOB_CLEANUP_RETENTION_DAYS, "30"),
    (keys::SCHEDULER_CHECK_INTERVAL_MINUTES, "5"),
    (keys::SCHEDULER_CATCHUP_ENABLED, "true"),
    (keys::SCHEDULER_CATCHUP_DELAY_SECONDS, "60"),
];

pub trait SettingsStore: Send + Sync {
    fn get_value(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn get(&self, key: &str, default: &str) -> String {
        match self.get_value(key) {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!("Failed to read setting {}: {:#}", key, e);
                default.to_string()
            }
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        let raw = match self.get_value(key) {
            Ok(Some(value)) => value,
            Ok(None) => return default,
            Err(e) => {
                warn!("Failed to read setting {}: {:#}", key, e);
                return default;
            }
        };
        parse_bool(&raw).unwrap_or_else(|| {
            warn!("Setting {} has non-boolean value '{}'", key, raw);
            default
        })
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        let raw = match self.get_value(key) {
            Ok(Some(value)) => value,
            Ok(None) => return default,
            Err(e) => {
                warn!("Failed to read setting {}: {:#}", key, e);
                return default;
            }
        };
        raw.trim().parse().unwrap_or_else(|_| {
            warn!("Setting {} has non-integer value '{}'", key, raw);
            default
        })
    }

    fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = match self.get_value(key) {
            Ok(value) => value?,
            Err(e) => {
                warn!("Failed to read setting {}: {:#}", key, e);
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                warn!("Setting {} has invalid timestamp '{}'", key, raw);
                None
            }
        }
    }

    fn set_time(&self, key: &str, time: DateTime<Utc>) -> Result<()> {
        self.set(key, &time.to_rfc3339())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Writes defaults and config-file overrides for every key not yet present.
/// Returns how many keys were written.
pub fn seed_defaults(
    store: &dyn SettingsStore,
    overrides: &HashMap<String, String>,
) -> Result<usize> {
    let mut merged: HashMap<&str, &str> = DEFAULT_SETTINGS.iter().copied().collect();
    for (key, value) in overrides {
        merged.insert(key.as_str(), value.as_str());
    }

    let mut written = 0;
    for (key, value) in merged {
        if store
            .get_value(key)
            .with_context(|| format!("Failed to read setting {}", key))?
            .is_none()
        {
            store
                .set(key, value)
                .with_context(|| format!("Failed to seed setting {}", key))?;
            written += 1;
        }
    }
    if written > 0 {
        info!("Seeded {} default settings", written);
    }
    Ok(written)
}

//! Cardkeep Server Library
//!
//! Keeps a local card catalog in sync with remote bulk-data feeds.

pub mod background_jobs;
pub mod catalog_store;
pub mod config;
pub mod import;
pub mod jobs;
pub mod metrics;
pub mod server_store;
pub mod settings;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use jobs::JobLedger;
pub use server_store::SqliteServerStore;
pub use settings::SettingsStore;

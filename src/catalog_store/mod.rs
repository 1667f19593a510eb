//! Local copy of the remote card and set catalogs.

mod models;
mod schema;
mod sqlite_catalog_store;

pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use sqlite_catalog_store::SqliteCatalogStore;

use anyhow::Result;

/// Upsert-only catalog storage. Rows missing from a feed are kept.
pub trait CatalogStore: Send + Sync {
    /// Inserts or updates cards in one transaction, returning rows written.
    fn upsert_cards(&self, cards: &[CardRecord]) -> Result<usize>;
    /// Inserts or updates sets in one transaction, returning rows written.
    /// Never touches a stored `icon_path`.
    fn upsert_sets(&self, sets: &[SetRecord]) -> Result<usize>;
    fn count_cards(&self) -> Result<usize>;
    fn count_sets(&self) -> Result<usize>;
    fn get_card(&self, id: &str) -> Result<Option<StoredCard>>;
    fn get_set(&self, code: &str) -> Result<Option<StoredSet>>;
    fn set_icon_path(&self, code: &str, path: &str) -> Result<()>;
}

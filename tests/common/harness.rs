use super::FeedServer;
use cardkeep_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use cardkeep_server::import::{
    AssetDownloader, CardAdapter, CatalogImporter, ImportConfig, ImportEngine, ImportService,
    SetAdapter,
};
use cardkeep_server::jobs::JobLedger;
use cardkeep_server::server_store::SqliteServerStore;
use cardkeep_server::settings::{keys, seed_defaults, SettingsStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Real stores in a temp dir, with both importers pointed at a
/// [`FeedServer`].
pub struct Harness {
    pub server_store: Arc<SqliteServerStore>,
    pub catalog_store: Arc<SqliteCatalogStore>,
    pub cards: Arc<dyn CatalogImporter>,
    pub sets: Arc<dyn CatalogImporter>,
    pub assets_dir: PathBuf,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn new(feed: &FeedServer) -> Self {
        Self::with_batch_size(feed, 10)
    }

    pub fn with_batch_size(feed: &FeedServer, batch_size: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let server_store = Arc::new(
            SqliteServerStore::new(temp_dir.path().join("server.db"))
                .expect("Failed to open server store"),
        );
        let catalog_store = Arc::new(
            SqliteCatalogStore::new(temp_dir.path().join("catalog.db"))
                .expect("Failed to open catalog store"),
        );
        let assets_dir = temp_dir.path().join("assets");

        let overrides: HashMap<String, String> = [
            (keys::url("card_data"), feed.catalog_url()),
            (keys::url("set_data"), feed.catalog_url()),
        ]
        .into_iter()
        .collect();
        seed_defaults(server_store.as_ref(), &overrides).expect("Failed to seed settings");

        let settings: Arc<dyn SettingsStore> = server_store.clone();
        let ledger: Arc<dyn JobLedger> = server_store.clone();
        let catalog: Arc<dyn CatalogStore> = catalog_store.clone();
        let config = ImportConfig {
            batch_size,
            failure_threshold: 0.05,
            http_timeout: Duration::from_secs(5),
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build client");

        let cards: Arc<dyn CatalogImporter> = Arc::new(ImportService::new(
            ImportEngine::new(
                Arc::new(CardAdapter::new(catalog.clone())),
                client.clone(),
                settings.clone(),
                ledger.clone(),
                config.clone(),
            ),
            ledger.clone(),
            settings.clone(),
        ));
        let sets: Arc<dyn CatalogImporter> = Arc::new(ImportService::new(
            ImportEngine::new(
                Arc::new(SetAdapter::new(
                    catalog,
                    AssetDownloader::new(client.clone(), Duration::from_secs(5)),
                    assets_dir.clone(),
                )),
                client,
                settings.clone(),
                ledger.clone(),
                config,
            ),
            ledger,
            settings,
        ));

        Self {
            server_store,
            catalog_store,
            cards,
            sets,
            assets_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.server_store.as_ref()
    }

    pub fn ledger(&self) -> &dyn JobLedger {
        self.server_store.as_ref()
    }
}

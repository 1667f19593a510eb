use anyhow::{Context, Result};
use cardkeep_server::background_jobs::tasks::{dataset_refresh_definition, job_cleanup_definition};
use cardkeep_server::background_jobs::{Scheduler, SchedulerConfig};
use cardkeep_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use cardkeep_server::config::{AppConfig, CliConfig, FileConfig};
use cardkeep_server::import::{
    trigger_initial_import, AssetDownloader, CardAdapter, CatalogImporter, DatasetKind,
    ImportEngine, ImportService, SetAdapter,
};
use cardkeep_server::jobs::JobLedger;
use cardkeep_server::metrics;
use cardkeep_server::server_store::SqliteServerStore;
use cardkeep_server::settings::{seed_defaults, SettingsStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding server.db and catalog.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for downloaded assets. Defaults to <db_dir>/assets.
    #[clap(long, value_parser = parse_path)]
    pub assets_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Timeout in seconds for catalog and asset requests.
    #[clap(long, default_value_t = 60)]
    pub http_timeout_sec: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            assets_dir: self.assets_dir.clone(),
            metrics_port: self.metrics_port,
            http_timeout_sec: self.http_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening server database at {:?}...", config.server_db_path());
    let server_store = Arc::new(SqliteServerStore::new(config.server_db_path())?);
    let settings: Arc<dyn SettingsStore> = server_store.clone();
    let ledger: Arc<dyn JobLedger> = server_store;

    info!("Opening catalog database at {:?}...", config.catalog_db_path());
    let catalog_store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);

    seed_defaults(settings.as_ref(), &config.settings)?;
    let stale = ledger.cancel_stale_jobs()?;
    if stale > 0 {
        warn!("Cancelled {} jobs left over from a previous run", stale);
    }

    info!("Initializing metrics...");
    metrics::init_metrics();
    metrics::set_catalog_items(DatasetKind::Cards.key(), catalog_store.count_cards()?);
    metrics::set_catalog_items(DatasetKind::Sets.key(), catalog_store.count_sets()?);

    // Feeds can take many minutes to stream, so only connecting is bounded
    // here. Catalog and asset requests set their own per-request timeout.
    let client = reqwest::Client::builder()
        .connect_timeout(config.http_timeout())
        .user_agent(concat!("cardkeep/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let cards: Arc<dyn CatalogImporter> = Arc::new(ImportService::new(
        ImportEngine::new(
            Arc::new(CardAdapter::new(catalog_store.clone())),
            client.clone(),
            settings.clone(),
            ledger.clone(),
            config.import.clone(),
        ),
        ledger.clone(),
        settings.clone(),
    ));
    let sets: Arc<dyn CatalogImporter> = Arc::new(ImportService::new(
        ImportEngine::new(
            Arc::new(SetAdapter::new(
                catalog_store.clone(),
                AssetDownloader::new(client.clone(), config.http_timeout()),
                config.assets_dir.clone(),
            )),
            client,
            settings.clone(),
            ledger.clone(),
            config.import.clone(),
        ),
        ledger.clone(),
        settings.clone(),
    ));

    let root_token = CancellationToken::new();

    for importer in [&cards, &sets] {
        if let Err(e) = trigger_initial_import(Arc::clone(importer), root_token.clone()) {
            error!("Failed to start initial {} import: {:#}", importer.kind(), e);
        }
    }

    let mut scheduler = Scheduler::new(
        settings.clone(),
        SchedulerConfig::from_settings(settings.as_ref()),
    );
    scheduler.register(dataset_refresh_definition(cards))?;
    scheduler.register(dataset_refresh_definition(sets))?;
    scheduler.register(job_cleanup_definition(ledger, settings))?;
    let scheduler = Arc::new(scheduler);
    scheduler.start(&root_token);

    let metrics_port = config.metrics_port;
    let metrics_token = root_token.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve_metrics(metrics_port, metrics_token).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, stopping...");
    root_token.cancel();
    scheduler.stop().await;
    info!("Bye");

    Ok(())
}

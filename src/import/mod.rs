//! Streaming import of remote JSON-array feeds into the local catalog.
//!
//! A run resolves the feed location from a small dataset catalog, streams
//! the feed through an incremental decoder, converts and upserts it batch
//! by batch, and finally judges the run by its failure rate. Batches
//! committed before a failing verdict stay committed.

mod array_decoder;
mod asset_downloader;
mod cards;
mod dataset;
mod dataset_catalog;
mod engine;
mod error;
mod progress;
mod service;
mod sets;

pub use array_decoder::{spawn_array_decoder, DecodeError, DecodedBatches};
pub use asset_downloader::AssetDownloader;
pub use cards::CardAdapter;
pub use dataset::DatasetKind;
pub use dataset_catalog::{resolve_dataset, DatasetCatalog, DatasetEntry};
pub use engine::{BatchApplied, DatasetAdapter, ImportConfig, ImportEngine, ImportSummary};
pub use error::ImportError;
pub use progress::{
    truncate_message, ImportBatchResult, ImportPhase, ImportProgress, MAX_FAILURE_EXAMPLES,
    MAX_FAILURE_MESSAGE_CHARS,
};
pub use service::{
    trigger_initial_import, CatalogImporter, ImportService, STATUS_FAILED, STATUS_IN_PROGRESS,
    STATUS_SUCCESS,
};
pub use sets::SetAdapter;

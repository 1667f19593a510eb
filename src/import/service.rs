//! Job-tracked imports, one service per dataset.

use super::engine::{DatasetAdapter, ImportEngine, ImportSummary};
use super::progress::ImportProgress;
use super::{DatasetKind, ImportError};
use crate::jobs::{Job, JobLedger};
use crate::metrics;
use crate::settings::{keys, SettingsStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// Dataset-agnostic handle used by the scheduler and the startup path.
#[async_trait]
pub trait CatalogImporter: Send + Sync {
    fn kind(&self) -> DatasetKind;

    /// Creates a pending job whose metadata is a queued [`ImportProgress`].
    fn create_import_job(&self) -> Result<Job>;

    /// Runs the import tracked by `job_id` and settles the job.
    ///
    /// On failure the error text is stored on the job and the same error is
    /// returned.
    async fn download_and_import(
        &self,
        token: CancellationToken,
        job_id: i64,
    ) -> Result<ImportSummary, ImportError>;

    /// Rows currently held locally for this dataset.
    fn local_count(&self) -> Result<usize>;
}

pub struct ImportService<A: DatasetAdapter> {
    engine: ImportEngine<A>,
    ledger: Arc<dyn JobLedger>,
    settings: Arc<dyn SettingsStore>,
    running: AtomicBool,
}

/// Clears the running flag when dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: DatasetAdapter> ImportService<A> {
    pub fn new(
        engine: ImportEngine<A>,
        ledger: Arc<dyn JobLedger>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            engine,
            ledger,
            settings,
            running: AtomicBool::new(false),
        }
    }

    fn set_status(&self, status: &str) {
        let key = keys::last_update_status(self.kind().key());
        if let Err(e) = self.settings.set(&key, status) {
            warn!("Failed to persist {}={}: {:#}", key, status, e);
        }
    }

    async fn import(
        &self,
        job_id: i64,
        token: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        self.set_status(STATUS_IN_PROGRESS);
        self.ledger.start(job_id)?;
        info!("Starting {} import (job {})", self.kind(), job_id);
        self.engine.run(job_id, token).await
    }

    fn settle(
        &self,
        job_id: i64,
        result: &Result<ImportSummary, ImportError>,
        elapsed: Duration,
    ) {
        let kind = self.kind();
        match result {
            Ok(summary) => {
                if let Err(e) = self.ledger.complete(job_id) {
                    warn!("Failed to complete job {}: {:#}", job_id, e);
                }
                if let Err(e) = self
                    .settings
                    .set_time(&keys::last_update(kind.key()), Utc::now())
                {
                    warn!("Failed to persist last update of {}: {:#}", kind, e);
                }
                self.set_status(STATUS_SUCCESS);
                info!(
                    "{} import finished in {:.1}s: {} records imported, {} failed (job {})",
                    kind,
                    elapsed.as_secs_f64(),
                    summary.succeeded,
                    summary.failed,
                    job_id
                );
                metrics::record_import_run(kind.key(), STATUS_SUCCESS, elapsed);
                match self.local_count() {
                    Ok(count) => metrics::set_catalog_items(kind.key(), count),
                    Err(e) => warn!("Failed to count local {} rows: {:#}", kind, e),
                }
            }
            Err(err) => {
                if let Err(e) = self.ledger.fail(job_id, &err.to_string()) {
                    warn!("Failed to mark job {} as failed: {:#}", job_id, e);
                }
                // the run holding the lock owns the status
                if !matches!(err, ImportError::AlreadyRunning) {
                    self.set_status(STATUS_FAILED);
                }
                error!("{} import failed (job {}): {}", kind, job_id, err);
                metrics::record_import_run(kind.key(), err.kind(), elapsed);
            }
        }
    }
}

#[async_trait]
impl<A: DatasetAdapter> CatalogImporter for ImportService<A> {
    fn kind(&self) -> DatasetKind {
        self.engine.adapter().kind()
    }

    fn create_import_job(&self) -> Result<Job> {
        let kind = self.kind();
        self.ledger
            .create(kind.job_type(), &ImportProgress::new(kind).to_json())
    }

    async fn download_and_import(
        &self,
        token: CancellationToken,
        job_id: i64,
    ) -> Result<ImportSummary, ImportError> {
        let started = Instant::now();
        let result = match RunGuard::acquire(&self.running) {
            Some(guard) => {
                let result = self.import(job_id, &token).await;
                drop(guard);
                result
            }
            None => Err(ImportError::AlreadyRunning),
        };
        self.settle(job_id, &result, started.elapsed());
        result
    }

    fn local_count(&self) -> Result<usize> {
        self.engine.adapter().local_count()
    }
}

/// Starts a background import when the local catalog for `importer` is
/// empty. Returns the id of the job created, or `None` if rows exist.
pub fn trigger_initial_import(
    importer: Arc<dyn CatalogImporter>,
    token: CancellationToken,
) -> Result<Option<i64>> {
    let kind = importer.kind();
    let count = importer.local_count()?;
    if count > 0 {
        info!(
            "Local {} catalog has {} rows, skipping initial import",
            kind, count
        );
        return Ok(None);
    }

    let job = importer.create_import_job()?;
    info!(
        "Local {} catalog is empty, starting initial import (job {})",
        kind, job.id
    );
    let job_id = job.id;
    tokio::spawn(async move {
        if let Err(e) = importer.download_and_import(token, job_id).await {
            warn!("Initial {} import did not complete: {}", kind, e);
        }
    });
    Ok(Some(job_id))
}

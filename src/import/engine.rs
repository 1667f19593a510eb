//! The feed-import algorithm shared by every dataset.

use super::array_decoder::{spawn_array_decoder, DecodeError, DecodedBatches};
use super::dataset_catalog::{resolve_dataset, DatasetEntry};
use super::progress::{ImportBatchResult, ImportPhase, ImportProgress};
use super::{DatasetKind, ImportError};
use crate::jobs::JobLedger;
use crate::metrics;
use crate::settings::{keys, SettingsStore};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    /// Highest tolerated `failed / processed` ratio, inclusive.
    pub failure_threshold: f64,
    /// Per-request timeout for the dataset catalog and assets, connect
    /// timeout for feeds.
    pub http_timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            failure_threshold: 0.05,
            http_timeout: Duration::from_secs(60),
        }
    }
}

/// What an adapter did with one converted batch.
#[derive(Debug, Default)]
pub struct BatchApplied {
    /// Rows written to the store.
    pub applied: usize,
    /// Side-effect failures on rows that were otherwise written.
    pub enrichment_failures: Vec<String>,
}

/// Dataset-specific half of an import: record shape and persistence.
#[async_trait]
pub trait DatasetAdapter: Send + Sync + 'static {
    type Record: Send + 'static;

    fn kind(&self) -> DatasetKind;

    /// Converts one raw feed element. Errors are counted, not propagated.
    fn convert(&self, raw: Value) -> Result<Self::Record, String>;

    async fn apply_batch(
        &self,
        records: Vec<Self::Record>,
        token: &CancellationToken,
    ) -> anyhow::Result<BatchApplied>;

    fn local_count(&self) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub failure_rate: f64,
}

impl From<&ImportProgress> for ImportSummary {
    fn from(progress: &ImportProgress) -> Self {
        Self {
            processed: progress.processed,
            succeeded: progress.succeeded,
            failed: progress.failed,
            batches: progress.batches,
            failure_rate: progress.failure_rate(),
        }
    }
}

pub struct ImportEngine<A: DatasetAdapter> {
    adapter: Arc<A>,
    client: reqwest::Client,
    settings: Arc<dyn SettingsStore>,
    ledger: Arc<dyn JobLedger>,
    config: ImportConfig,
}

impl<A: DatasetAdapter> ImportEngine<A> {
    pub fn new(
        adapter: Arc<A>,
        client: reqwest::Client,
        settings: Arc<dyn SettingsStore>,
        ledger: Arc<dyn JobLedger>,
        config: ImportConfig,
    ) -> Self {
        Self {
            adapter,
            client,
            settings,
            ledger,
            config,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Runs a full import for `job_id`, publishing progress as the job's
    /// metadata. The job's own status is left to the caller.
    pub async fn run(
        &self,
        job_id: i64,
        token: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let mut progress = ImportProgress::new(self.adapter.kind());
        let result = self.run_phases(job_id, &mut progress, token).await;

        match &result {
            Ok(_) => progress.phase = ImportPhase::Completed,
            Err(e) => {
                progress.phase = ImportPhase::Failed;
                progress.error = Some(e.to_string());
            }
        }
        self.publish(job_id, &progress);
        metrics::record_import_records(
            self.adapter.kind().key(),
            progress.succeeded,
            progress.failed,
        );
        result
    }

    async fn run_phases(
        &self,
        job_id: i64,
        progress: &mut ImportProgress,
        token: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        progress.phase = ImportPhase::Resolving;
        self.publish(job_id, progress);
        let entry = self.resolve().await?;
        info!(
            "Resolved {} feed to {} (updated_at {:?})",
            self.adapter.kind(),
            entry.download_uri,
            entry.updated_at
        );

        progress.phase = ImportPhase::Downloading;
        progress.download_uri = Some(entry.download_uri.clone());
        self.publish(job_id, progress);
        // stops the body stream however this run ends
        let feed_token = token.child_token();
        let _feed_guard = feed_token.clone().drop_guard();
        let reader = self.open_feed(&entry.download_uri, &feed_token).await?;

        progress.phase = ImportPhase::Importing;
        self.publish(job_id, progress);
        self.apply_feed(reader, job_id, progress, &feed_token).await?;
        self.verdict(progress)
    }

    /// Decides the run's outcome from its failure rate. Rows already
    /// committed stay committed either way.
    pub fn verdict(&self, progress: &ImportProgress) -> Result<ImportSummary, ImportError> {
        let rate = progress.failure_rate();
        if rate > self.config.failure_threshold {
            return Err(ImportError::ThresholdExceeded {
                rate,
                threshold: self.config.failure_threshold,
                failed: progress.failed,
                total: progress.failed + progress.succeeded,
            });
        }
        if progress.failed > 0 {
            warn!(
                "{} import finished with {} failed records out of {} (examples: {:?})",
                self.adapter.kind(),
                progress.failed,
                progress.processed,
                progress.failure_examples
            );
        }
        Ok(ImportSummary::from(progress))
    }

    /// Looks up the feed location from the `{key}_url` and
    /// `{key}_dataset_type` settings.
    pub async fn resolve(&self) -> Result<DatasetEntry, ImportError> {
        let kind = self.adapter.kind();
        let url_key = keys::url(kind.key());
        let catalog_url = self
            .settings
            .get_value(&url_key)?
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ImportError::Config(format!("setting {} is not set", url_key)))?;
        let dataset_type = self.settings.get(
            &keys::dataset_type(kind.key()),
            kind.default_dataset_type(),
        );

        resolve_dataset(
            &self.client,
            catalog_url.trim(),
            &dataset_type,
            self.config.http_timeout,
        )
        .await
    }

    /// Opens a streaming GET on `uri` as a blocking reader. The body ends
    /// early once `token` is cancelled.
    pub async fn open_feed(
        &self,
        uri: &str,
        token: &CancellationToken,
    ) -> Result<impl Read + Send + 'static, ImportError> {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(ImportError::Cancelled),
            response = self.client.get(uri).send() => response
                .map_err(|e| ImportError::Transport(format!("{}: {}", uri, e)))?,
        };

        if !response.status().is_success() {
            return Err(ImportError::HttpStatus {
                status: response.status().as_u16(),
                url: uri.to_string(),
            });
        }
        if let Some(length) = response.content_length() {
            debug!("Feed {} is {} bytes", uri, length);
        }

        let body = Box::pin(
            response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .take_until(token.clone().cancelled_owned()),
        );
        Ok(BufReader::new(SyncIoBridge::new(StreamReader::new(body))))
    }

    /// Decodes `reader` as a JSON array and applies it batch by batch.
    pub async fn apply_feed<R>(
        &self,
        reader: R,
        job_id: i64,
        progress: &mut ImportProgress,
        token: &CancellationToken,
    ) -> Result<(), ImportError>
    where
        R: Read + Send + 'static,
    {
        let decoder_token = token.child_token();
        let DecodedBatches {
            mut batches,
            handle,
        } = spawn_array_decoder(reader, self.config.batch_size, decoder_token.clone());

        if let Err(e) = self
            .consume_batches(&mut batches, job_id, progress, token)
            .await
        {
            // The decoder may be parked inside a read that only the caller's
            // stream can end, so it is left to finish on its own.
            decoder_token.cancel();
            drop(batches);
            return Err(e);
        }

        let decoded = handle
            .await
            .map_err(|e| ImportError::Framing(format!("decoder task failed: {}", e)))?;

        match decoded {
            Ok(count) => {
                debug!("Decoded {} {} records", count, self.adapter.kind());
                Ok(())
            }
            Err(DecodeError::Cancelled) => Err(ImportError::Cancelled),
            // a cancelled body ends early, which reads as truncated input
            Err(DecodeError::Io(msg)) | Err(DecodeError::Framing(msg)) if token.is_cancelled() => {
                debug!("Feed read interrupted by cancellation: {}", msg);
                Err(ImportError::Cancelled)
            }
            Err(DecodeError::Io(msg)) => Err(ImportError::Transport(msg)),
            Err(DecodeError::Framing(msg)) => Err(ImportError::Framing(msg)),
        }
    }

    async fn consume_batches(
        &self,
        batches: &mut mpsc::Receiver<Vec<Value>>,
        job_id: i64,
        progress: &mut ImportProgress,
        token: &CancellationToken,
    ) -> Result<(), ImportError> {
        loop {
            let raw_batch = tokio::select! {
                _ = token.cancelled() => return Err(ImportError::Cancelled),
                batch = batches.recv() => match batch {
                    Some(batch) => batch,
                    None => return Ok(()),
                },
            };

            let mut result = ImportBatchResult::default();
            let mut records = Vec::with_capacity(raw_batch.len());
            for raw in raw_batch {
                match self.adapter.convert(raw) {
                    Ok(record) => records.push(record),
                    Err(message) => result.record_failure(message),
                }
            }

            let applied = self.adapter.apply_batch(records, token).await?;
            result.succeeded = applied
                .applied
                .saturating_sub(applied.enrichment_failures.len()) as u64;
            for message in applied.enrichment_failures {
                result.record_failure(message);
            }

            progress.absorb(&result);
            self.publish(job_id, progress);
            debug!(
                "{} batch {} applied: {} ok, {} failed",
                self.adapter.kind(),
                progress.batches,
                result.succeeded,
                result.failed
            );
        }
    }

    fn publish(&self, job_id: i64, progress: &ImportProgress) {
        if let Err(e) = self.ledger.update_metadata(job_id, &progress.to_json()) {
            warn!("Failed to publish progress for job {}: {:#}", job_id, e);
        }
    }
}

//! Scheduled refresh of one catalog dataset from its remote feed.

use crate::background_jobs::{TaskContext, TaskDefinition, TaskError, TaskRunner, TimeOfDay};
use crate::import::{CatalogImporter, DatasetKind, ImportError};
use crate::settings::keys;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct DatasetRefreshTask {
    importer: Arc<dyn CatalogImporter>,
}

impl DatasetRefreshTask {
    pub fn new(importer: Arc<dyn CatalogImporter>) -> Self {
        Self { importer }
    }
}

#[async_trait]
impl TaskRunner for DatasetRefreshTask {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        let kind = self.importer.kind();
        let job = self
            .importer
            .create_import_job()
            .map_err(|e| TaskError::ExecutionFailed(format!("Failed to create job: {:#}", e)))?;
        info!("Refreshing {} data ({}, job {})", kind, ctx.trigger, job.id);

        match self
            .importer
            .download_and_import(ctx.cancellation_token.clone(), job.id)
            .await
        {
            Ok(_) => Ok(()),
            Err(ImportError::Cancelled) => Err(TaskError::Cancelled),
            Err(e) => Err(TaskError::ExecutionFailed(e.to_string())),
        }
    }
}

/// Card data refreshes daily, set data every two weeks.
fn refresh_interval(kind: DatasetKind) -> Duration {
    match kind {
        DatasetKind::Cards => DAY,
        DatasetKind::Sets => DAY * 14,
    }
}

fn default_update_time(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::Cards => "03:00",
        DatasetKind::Sets => "04:00",
    }
}

pub fn dataset_refresh_definition(importer: Arc<dyn CatalogImporter>) -> TaskDefinition {
    let kind = importer.kind();
    let dataset = kind.key();
    TaskDefinition::new(
        kind.refresh_task_name(),
        refresh_interval(kind),
        Arc::new(DatasetRefreshTask::new(importer)),
    )
    .with_time_of_day(TimeOfDay::Setting {
        key: keys::update_time(dataset),
        default: default_update_time(kind).to_string(),
    })
    .with_enabled_key(keys::auto_update(dataset))
    .with_last_run_key(keys::last_update(dataset))
}

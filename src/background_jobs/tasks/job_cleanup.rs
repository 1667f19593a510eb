//! Retention cleanup of the job ledger.

use crate::background_jobs::{TaskContext, TaskDefinition, TaskError, TaskRunner, TimeOfDay};
use crate::jobs::JobLedger;
use crate::metrics;
use crate::settings::{keys, SettingsStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const JOB_CLEANUP_TASK: &str = "job_cleanup";
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

pub struct JobCleanupTask {
    ledger: Arc<dyn JobLedger>,
    settings: Arc<dyn SettingsStore>,
}

impl JobCleanupTask {
    pub fn new(ledger: Arc<dyn JobLedger>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { ledger, settings }
    }

    fn retention_days(&self) -> i64 {
        let days = self
            .settings
            .get_int(keys::JOB_CLEANUP_RETENTION_DAYS, DEFAULT_RETENTION_DAYS);
        if days < 1 {
            warn!(
                "Ignoring {}={}, keeping at least one day of jobs",
                keys::JOB_CLEANUP_RETENTION_DAYS,
                days
            );
        }
        days.max(1)
    }
}

#[async_trait]
impl TaskRunner for JobCleanupTask {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let retention_days = self.retention_days();
        let deleted = self
            .ledger
            .cleanup_older_than(retention_days)
            .map_err(|e| TaskError::ExecutionFailed(format!("{:#}", e)))?;
        metrics::record_jobs_cleaned(deleted);
        info!(
            "Removed {} jobs older than {} days",
            deleted, retention_days
        );

        if let Err(e) = self.settings.set_time(keys::JOB_CLEANUP_LAST_RUN, Utc::now()) {
            warn!("Failed to persist {}: {:#}", keys::JOB_CLEANUP_LAST_RUN, e);
        }
        Ok(())
    }
}

pub fn job_cleanup_definition(
    ledger: Arc<dyn JobLedger>,
    settings: Arc<dyn SettingsStore>,
) -> TaskDefinition {
    TaskDefinition::new(
        JOB_CLEANUP_TASK,
        Duration::from_secs(24 * 60 * 60),
        Arc::new(JobCleanupTask::new(ledger, settings)),
    )
    .with_time_of_day(TimeOfDay::Fixed("02:00".to_string()))
    .with_last_run_key(keys::JOB_CLEANUP_LAST_RUN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::TaskTrigger;
    use crate::jobs::JobType;
    use crate::sqlite_persistence::format_timestamp;
    use rusqlite::{params, Connection};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use crate::server_store::SqliteServerStore;

    struct Fixture {
        store: Arc<SqliteServerStore>,
        temp_dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let store =
                Arc::new(SqliteServerStore::new(temp_dir.path().join("server.db")).unwrap());
            Self { store, temp_dir }
        }

        fn task(&self) -> JobCleanupTask {
            JobCleanupTask::new(self.store.clone(), self.store.clone())
        }

        fn job_aged(&self, days: i64) -> i64 {
            let job = self
                .store
                .create(JobType::SetDataImport, &serde_json::json!({}))
                .unwrap();
            let created = Utc::now() - chrono::Duration::days(days);
            Connection::open(self.temp_dir.path().join("server.db"))
                .unwrap()
                .execute(
                    "UPDATE jobs SET created_at = ?1 WHERE id = ?2",
                    params![format_timestamp(&created), job.id],
                )
                .unwrap();
            job.id
        }

        fn exists(&self, id: i64) -> bool {
            JobLedger::get(self.store.as_ref(), id).unwrap().is_some()
        }
    }

    fn ctx(token: CancellationToken) -> TaskContext {
        TaskContext::new(token, TaskTrigger::Tick, Utc::now())
    }

    #[tokio::test]
    async fn removes_jobs_past_retention() {
        let fixture = Fixture::new();
        let old = fixture.job_aged(45);
        let recent = fixture.job_aged(3);

        fixture.task().run(ctx(CancellationToken::new())).await.unwrap();

        assert!(!fixture.exists(old));
        assert!(fixture.exists(recent));
        assert!(fixture
            .store
            .get_time(keys::JOB_CLEANUP_LAST_RUN)
            .is_some());
    }

    #[tokio::test]
    async fn honors_configured_retention() {
        let fixture = Fixture::new();
        fixture
            .store
            .set(keys::JOB_CLEANUP_RETENTION_DAYS, "2")
            .unwrap();
        let old = fixture.job_aged(3);

        fixture.task().run(ctx(CancellationToken::new())).await.unwrap();
        assert!(!fixture.exists(old));
    }

    #[tokio::test]
    async fn retention_below_one_day_is_clamped() {
        let fixture = Fixture::new();
        fixture
            .store
            .set(keys::JOB_CLEANUP_RETENTION_DAYS, "0")
            .unwrap();
        let today = fixture.job_aged(0);
        let old = fixture.job_aged(2);

        fixture.task().run(ctx(CancellationToken::new())).await.unwrap();
        assert!(fixture.exists(today));
        assert!(!fixture.exists(old));
    }

    #[tokio::test]
    async fn huge_retention_keeps_every_job() {
        let fixture = Fixture::new();
        fixture
            .store
            .set(keys::JOB_CLEANUP_RETENTION_DAYS, "1000000000")
            .unwrap();
        let old = fixture.job_aged(45);

        fixture.task().run(ctx(CancellationToken::new())).await.unwrap();
        assert!(fixture.exists(old));
        assert!(fixture
            .store
            .get_time(keys::JOB_CLEANUP_LAST_RUN)
            .is_some());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let fixture = Fixture::new();
        let old = fixture.job_aged(45);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            fixture.task().run(ctx(token)).await,
            Err(TaskError::Cancelled)
        ));
        assert!(fixture.exists(old));
    }

    #[test]
    fn definition_runs_nightly_and_always_enabled() {
        let fixture = Fixture::new();
        let def = job_cleanup_definition(fixture.store.clone(), fixture.store.clone());
        assert_eq!(def.name, "job_cleanup");
        assert_eq!(def.enabled_key, None);
        assert_eq!(def.time_of_day, Some(TimeOfDay::Fixed("02:00".to_string())));
        assert_eq!(def.last_run_key.as_deref(), Some(keys::JOB_CLEANUP_LAST_RUN));
    }
}

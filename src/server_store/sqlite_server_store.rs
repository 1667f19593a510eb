use super::schema::SERVER_VERSIONED_SCHEMAS;
use crate::jobs::{Job, JobLedger, JobPage, JobQuery, JobStatus, JobType, STALE_JOB_ERROR};
use crate::settings::SettingsStore;
use crate::sqlite_persistence::{format_timestamp, open_versioned, parse_timestamp};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const JOB_COLUMNS: &str =
    "id, job_type, status, metadata, error, created_at, updated_at, started_at, completed_at";

/// Statuses a job can still leave.
const OPEN_STATUSES: &str = "('pending', 'in_progress')";

pub struct SqliteServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteServerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, SERVER_VERSIONED_SCHEMAS, "server")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("server database lock poisoned"))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let job_type_str: String = row.get("job_type")?;
        let job_type = JobType::parse(&job_type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown job type '{}'", job_type_str).into(),
            )
        })?;
        let status_str: String = row.get("status")?;
        let status = JobStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown job status '{}'", status_str).into(),
            )
        })?;

        let metadata_str: String = row.get("metadata")?;
        let metadata = serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null);

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let started_at: Option<String> = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;

        Ok(Job {
            id: row.get("id")?,
            job_type,
            status,
            metadata,
            error: row.get("error")?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
            started_at: started_at.as_deref().and_then(parse_timestamp),
            completed_at: completed_at.as_deref().and_then(parse_timestamp),
        })
    }

    /// Moves an open job into a terminal state. No-op for missing or closed jobs.
    fn finish(&self, id: i64, status: JobStatus, error: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        let updated = conn
            .execute(
                &format!(
                    "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3, updated_at = ?3
                     WHERE id = ?4 AND status IN {}",
                    OPEN_STATUSES
                ),
                params![status.as_str(), error, now, id],
            )
            .with_context(|| format!("Failed to mark job {} as {}", id, status.as_str()))?;
        if updated == 0 {
            debug!("Job {} not open, ignoring transition to {}", id, status.as_str());
        }
        Ok(())
    }
}

impl SettingsStore for SqliteServerStore {
    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read setting {}", key))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )
        .with_context(|| format!("Failed to write setting {}", key))?;
        Ok(())
    }
}

impl JobLedger for SqliteServerStore {
    fn create(&self, job_type: JobType, metadata: &serde_json::Value) -> Result<Job> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO jobs (job_type, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                job_type.as_str(),
                JobStatus::Pending.as_str(),
                metadata.to_string(),
                now
            ],
        )
        .with_context(|| format!("Failed to create {} job", job_type.as_str()))?;
        let id = conn.last_insert_rowid();

        let job = conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )?;
        Ok(job)
    }

    fn start(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        conn.execute(
            "UPDATE jobs SET status = ?1, started_at = ?2, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                JobStatus::InProgress.as_str(),
                now,
                id,
                JobStatus::Pending.as_str()
            ],
        )
        .with_context(|| format!("Failed to start job {}", id))?;
        Ok(())
    }

    fn complete(&self, id: i64) -> Result<()> {
        self.finish(id, JobStatus::Completed, None)
    }

    fn fail(&self, id: i64, message: &str) -> Result<()> {
        self.finish(id, JobStatus::Failed, Some(message))
    }

    fn cancel(&self, id: i64, reason: &str) -> Result<()> {
        self.finish(id, JobStatus::Cancelled, Some(reason))
    }

    fn update_metadata(&self, id: i64, metadata: &serde_json::Value) -> Result<()> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        conn.execute(
            &format!(
                "UPDATE jobs SET metadata = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN {}",
                OPEN_STATUSES
            ),
            params![metadata.to_string(), now, id],
        )
        .with_context(|| format!("Failed to update metadata of job {}", id))?;
        Ok(())
    }

    fn get(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                Self::row_to_job,
            )
            .optional()
            .with_context(|| format!("Failed to load job {}", id))?;
        Ok(job)
    }

    fn list(&self, query: &JobQuery) -> Result<JobPage> {
        let conn = self.conn()?;
        let (limit, offset) = query.limit_offset();
        let job_type = query.job_type.map(|t| t.as_str());
        let status = query.status.map(|s| s.as_str());

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE (?1 IS NULL OR job_type = ?1) AND (?2 IS NULL OR status = ?2)",
            params![job_type, status],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs
             WHERE (?1 IS NULL OR job_type = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(
                params![job_type, status, limit as i64, offset as i64],
                Self::row_to_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list jobs")?;

        Ok(JobPage {
            jobs,
            total: total as usize,
        })
    }

    fn cleanup_older_than(&self, retention_days: i64) -> Result<usize> {
        // a cutoff before the representable range keeps every job
        let Some(cutoff) = Duration::try_days(retention_days.max(0))
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            debug!("Retention of {} days reaches past any job", retention_days);
            return Ok(0);
        };
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM jobs WHERE created_at < ?1",
                params![format_timestamp(&cutoff)],
            )
            .context("Failed to clean up old jobs")?;
        Ok(deleted)
    }

    fn cancel_stale_jobs(&self) -> Result<usize> {
        let conn = self.conn()?;
        let now = format_timestamp(&Utc::now());
        let count = conn
            .execute(
                &format!(
                    "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3, updated_at = ?3
                     WHERE status IN {}",
                    OPEN_STATUSES
                ),
                params![JobStatus::Cancelled.as_str(), STALE_JOB_ERROR, now],
            )
            .context("Failed to cancel stale jobs")?;
        if count > 0 {
            info!("Cancelled {} jobs left over from a previous run", count);
        }
        Ok(count)
    }

    fn get_last_by_type(&self, job_type: JobType) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs WHERE job_type = ?1
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![job_type.as_str()],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }
}

//! Durable job bookkeeping, independent of what a job actually does.

mod models;

pub use models::*;

use anyhow::Result;

/// Error recorded on jobs orphaned by a crash or restart.
pub const STALE_JOB_ERROR: &str = "job was interrupted by a server restart";

/// Lifecycle store for jobs.
///
/// Status only ever moves forward: pending, then in_progress, then one of
/// the terminal states. Lifecycle calls against a missing or already
/// terminal job succeed without changing anything.
pub trait JobLedger: Send + Sync {
    fn create(&self, job_type: JobType, metadata: &serde_json::Value) -> Result<Job>;
    fn start(&self, id: i64) -> Result<()>;
    fn complete(&self, id: i64) -> Result<()>;
    fn fail(&self, id: i64, message: &str) -> Result<()>;
    fn cancel(&self, id: i64, reason: &str) -> Result<()>;
    /// Replaces the metadata blob of a job that is not yet terminal.
    fn update_metadata(&self, id: i64, metadata: &serde_json::Value) -> Result<()>;
    fn get(&self, id: i64) -> Result<Option<Job>>;
    fn list(&self, query: &JobQuery) -> Result<JobPage>;
    /// Deletes jobs created more than `retention_days` ago.
    fn cleanup_older_than(&self, retention_days: i64) -> Result<usize>;
    /// Cancels every job still pending or in progress. Called once at startup.
    fn cancel_stale_jobs(&self) -> Result<usize>;
    fn get_last_by_type(&self, job_type: JobType) -> Result<Option<Job>>;
}

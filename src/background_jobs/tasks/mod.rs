//! Concrete scheduled tasks.

pub mod dataset_refresh;
pub mod job_cleanup;

pub use dataset_refresh::{dataset_refresh_definition, DatasetRefreshTask};
pub use job_cleanup::{
    job_cleanup_definition, JobCleanupTask, DEFAULT_RETENTION_DAYS, JOB_CLEANUP_TASK,
};

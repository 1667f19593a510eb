use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of long-running operation a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CardDataImport,
    SetDataImport,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CardDataImport => "card_data_import",
            JobType::SetDataImport => "set_data_import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card_data_import" => Some(JobType::CardDataImport),
            "set_data_import" => Some(JobType::SetDataImport),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Producer-defined progress blob.
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
}

impl Default for JobQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            job_type: None,
            status: None,
        }
    }
}

impl JobQuery {
    /// Returns `(limit, offset)` after clamping page and page size.
    pub fn limit_offset(&self) -> (usize, usize) {
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        let page = self.page.max(1);
        (page_size, (page - 1) * page_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// Number of jobs matching the filters, across all pages.
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_serializes_timestamps_as_rfc3339() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let job = Job {
            id: 7,
            job_type: JobType::SetDataImport,
            status: JobStatus::Completed,
            metadata: serde_json::json!({"processed": 3}),
            error: None,
            created_at: created,
            updated_at: created,
            started_at: Some(created),
            completed_at: None,
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["created_at"], "2024-03-01T12:30:00Z");
        assert_eq!(value["job_type"], "set_data_import");
        assert_eq!(value["status"], "completed");
        assert_eq!(serde_json::from_value::<Job>(value).unwrap(), job);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("running"), None);
    }

    #[test]
    fn only_final_states_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn query_clamps_page_and_size() {
        let query = JobQuery {
            page: 0,
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(query.limit_offset(), (1, 0));

        let query = JobQuery {
            page: 3,
            page_size: 10_000,
            ..Default::default()
        };
        assert_eq!(query.limit_offset(), (MAX_PAGE_SIZE, 2 * MAX_PAGE_SIZE));
    }
}

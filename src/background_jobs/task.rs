use super::context::TaskContext;
use crate::settings::SettingsStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Start of the daily window in which a task may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeOfDay {
    /// Literal "HH:MM".
    Fixed(String),
    /// "HH:MM" read from a setting each time the task is evaluated.
    Setting { key: String, default: String },
}

impl TimeOfDay {
    pub fn resolve(&self, settings: &dyn SettingsStore) -> String {
        match self {
            TimeOfDay::Fixed(time) => time.clone(),
            TimeOfDay::Setting { key, default } => settings.get(key, default),
        }
    }
}

/// Errors that can occur during task execution.
#[derive(Debug)]
pub enum TaskError {
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            TaskError::Cancelled => write!(f, "Task was cancelled"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Body of a scheduled task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError>;
}

/// A named periodic task. Immutable once registered with the scheduler.
#[derive(Clone)]
pub struct TaskDefinition {
    pub name: String,
    /// Minimum time between two runs.
    pub interval: Duration,
    pub time_of_day: Option<TimeOfDay>,
    /// Boolean setting gating the task. `None` means always enabled.
    pub enabled_key: Option<String>,
    /// Timestamp setting consulted when the task has not run in this process.
    pub last_run_key: Option<String>,
    pub runner: Arc<dyn TaskRunner>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, interval: Duration, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            name: name.into(),
            interval,
            time_of_day: None,
            enabled_key: None,
            last_run_key: None,
            runner,
        }
    }

    pub fn with_time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    pub fn with_enabled_key(mut self, key: impl Into<String>) -> Self {
        self.enabled_key = Some(key.into());
        self
    }

    pub fn with_last_run_key(mut self, key: impl Into<String>) -> Self {
        self.last_run_key = Some(key.into());
        self
    }
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("time_of_day", &self.time_of_day)
            .field("enabled_key", &self.enabled_key)
            .field("last_run_key", &self.last_run_key)
            .finish_non_exhaustive()
    }
}

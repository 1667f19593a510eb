use chrono::{DateTime, Utc};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What caused a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTrigger {
    /// Regular check-interval tick, time-of-day window enforced.
    Tick,
    /// One-off pass shortly after startup, time-of-day window ignored.
    CatchUp,
    /// Explicit request, only the in-flight guard applies.
    Manual,
}

impl fmt::Display for TaskTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTrigger::Tick => write!(f, "tick"),
            TaskTrigger::CatchUp => write!(f, "catch-up"),
            TaskTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Context handed to a task body.
#[derive(Clone)]
pub struct TaskContext {
    /// Cancelled on process shutdown.
    pub cancellation_token: CancellationToken,
    pub trigger: TaskTrigger,
    pub triggered_at: DateTime<Utc>,
}

impl TaskContext {
    pub fn new(
        cancellation_token: CancellationToken,
        trigger: TaskTrigger,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cancellation_token,
            trigger,
            triggered_at,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

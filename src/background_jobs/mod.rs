//! Periodic tasks driven by a settings-aware scheduler.

pub mod context;
pub mod scheduler;
pub mod task;
pub mod tasks;

pub use context::{TaskContext, TaskTrigger};
pub use scheduler::{Scheduler, SchedulerConfig, MAX_SCHEDULER_PERIOD, TIME_WINDOW};
pub use task::{TaskDefinition, TaskError, TaskRunner, TimeOfDay};

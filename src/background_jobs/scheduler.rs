use super::context::{TaskContext, TaskTrigger};
use super::task::{TaskDefinition, TaskError};
use crate::metrics;
use crate::settings::{keys, SettingsStore};
use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Length of the half-open window opened by a task's time of day.
pub const TIME_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Upper bound for the check interval and the catch-up delay.
pub const MAX_SCHEDULER_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub check_interval: Duration,
    pub catchup_enabled: bool,
    pub catchup_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5 * 60),
            catchup_enabled: true,
            catchup_delay: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let minutes = settings.get_int(
            keys::SCHEDULER_CHECK_INTERVAL_MINUTES,
            (defaults.check_interval.as_secs() / 60) as i64,
        );
        let delay = settings.get_int(
            keys::SCHEDULER_CATCHUP_DELAY_SECONDS,
            defaults.catchup_delay.as_secs() as i64,
        );
        let max_secs = MAX_SCHEDULER_PERIOD.as_secs() as i64;
        Self {
            check_interval: Duration::from_secs(minutes.clamp(1, max_secs / 60) as u64 * 60),
            catchup_enabled: settings
                .get_bool(keys::SCHEDULER_CATCHUP_ENABLED, defaults.catchup_enabled),
            catchup_delay: Duration::from_secs(delay.clamp(0, max_secs) as u64),
        }
    }
}

/// Process-local bookkeeping. Lost on restart.
#[derive(Default)]
struct SchedulerState {
    /// Trigger time of the most recent run started in this process.
    last_run: HashMap<String, DateTime<Utc>>,
    running: HashSet<String>,
}

fn lock_state(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    // the state stays consistent even if a holder panicked
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-flight marker for one task, released on drop.
struct RunningGuard {
    state: Arc<Mutex<SchedulerState>>,
    name: String,
}

impl RunningGuard {
    /// Marks `name` as running and records `now` as its last run, unless it
    /// is already running.
    fn acquire(
        state: &Arc<Mutex<SchedulerState>>,
        name: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let mut guard = lock_state(state);
        if !guard.running.insert(name.to_string()) {
            return None;
        }
        guard.last_run.insert(name.to_string(), now);
        metrics::set_task_running(name, true);
        Some(Self {
            state: Arc::clone(state),
            name: name.to_string(),
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        lock_state(&self.state).running.remove(&self.name);
        metrics::set_task_running(&self.name, false);
    }
}

/// Runs registered tasks on a recurring check interval, at most one
/// instance of each task at a time.
pub struct Scheduler {
    settings: Arc<dyn SettingsStore>,
    config: SchedulerConfig,
    tasks: Vec<TaskDefinition>,
    state: Arc<Mutex<SchedulerState>>,
    /// Handed to task bodies. Replaced by the root token on start.
    task_token: Mutex<CancellationToken>,
    /// Stops the ticker and the catch-up pass.
    loop_token: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(settings: Arc<dyn SettingsStore>, config: SchedulerConfig) -> Self {
        Self {
            settings,
            config,
            tasks: Vec::new(),
            state: Arc::new(Mutex::new(SchedulerState::default())),
            task_token: Mutex::new(CancellationToken::new()),
            loop_token: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, task: TaskDefinition) -> Result<()> {
        if self.tasks.iter().any(|t| t.name == task.name) {
            bail!("Task {} is already registered", task.name);
        }
        info!(
            "Registered task {} (every {:?}, time of day {:?})",
            task.name, task.interval, task.time_of_day
        );
        self.tasks.push(task);
        Ok(())
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        lock_state(&self.state).running.contains(name)
    }

    /// Starts the periodic ticker and, if enabled, the one-off catch-up pass.
    ///
    /// Task bodies receive `root` itself; the loops run on a child token so
    /// [`Scheduler::stop`] does not cancel work already in flight.
    pub fn start(self: &Arc<Self>, root: &CancellationToken) {
        let loop_token = {
            let mut slot = self
                .loop_token
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.is_some() {
                warn!("Scheduler already started");
                return;
            }
            let token = root.child_token();
            *slot = Some(token.clone());
            token
        };
        *self
            .task_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = root.clone();

        info!(
            "Starting scheduler with {} tasks, checking every {:?}",
            self.tasks.len(),
            self.config.check_interval
        );

        let mut handles = Vec::new();

        let scheduler = Arc::clone(self);
        let token = loop_token.clone();
        let period = self.config.check_interval.min(MAX_SCHEDULER_PERIOD);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let started = scheduler.run_due_tasks(Utc::now(), false);
                        if !started.is_empty() {
                            debug!("Tick started tasks: {:?}", started);
                        }
                    }
                }
            }
            debug!("Scheduler ticker stopped");
        }));

        if self.config.catchup_enabled {
            let scheduler = Arc::clone(self);
            let token = loop_token;
            let delay = self.config.catchup_delay.min(MAX_SCHEDULER_PERIOD);
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        let started = scheduler.run_due_tasks(Utc::now(), true);
                        info!("Catch-up pass started {} tasks: {:?}", started.len(), started);
                    }
                }
            }));
        }

        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);
    }

    /// Stops the ticker and catch-up pass and waits for both to finish.
    /// Task bodies already running are left to the root token.
    pub async fn stop(&self) {
        let token = self
            .loop_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(token) = token {
            token.cancel();
        }

        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    /// Starts every due task on its own tokio task and returns their names.
    pub fn run_due_tasks(&self, now: DateTime<Utc>, skip_time_window: bool) -> Vec<String> {
        let trigger = if skip_time_window {
            TaskTrigger::CatchUp
        } else {
            TaskTrigger::Tick
        };

        let mut started = Vec::new();
        for task in &self.tasks {
            if self.is_due(task, now, skip_time_window) && self.spawn_task(task, now, trigger) {
                started.push(task.name.clone());
            }
        }
        started
    }

    /// Starts `name` right away, ignoring schedule and enabled flag.
    /// Returns false if the task is already running.
    pub fn trigger_now(&self, name: &str) -> Result<bool> {
        let Some(task) = self.tasks.iter().find(|t| t.name == name) else {
            bail!("Unknown task {}", name);
        };
        Ok(self.spawn_task(task, Utc::now(), TaskTrigger::Manual))
    }

    /// Whether `task` would be started by a regular tick at `now`.
    pub fn should_run_task(&self, task: &TaskDefinition, now: DateTime<Utc>) -> bool {
        self.is_due(task, now, false)
    }

    fn is_due(&self, task: &TaskDefinition, now: DateTime<Utc>, skip_time_window: bool) -> bool {
        if self.is_running(&task.name) {
            return false;
        }

        if let Some(key) = &task.enabled_key {
            if !self.settings.get_bool(key, false) {
                return false;
            }
        }

        if !skip_time_window {
            if let Some(time_of_day) = &task.time_of_day {
                let start = time_of_day.resolve(self.settings.as_ref());
                if !Self::is_in_time_window(&start, now.with_timezone(&Local).time()) {
                    return false;
                }
            }
        }

        let last_run = lock_state(&self.state)
            .last_run
            .get(&task.name)
            .copied()
            .or_else(|| {
                task.last_run_key
                    .as_deref()
                    .and_then(|key| self.settings.get_time(key))
            });
        match last_run {
            None => true,
            Some(last_run) => {
                let interval = TimeDelta::from_std(task.interval).unwrap_or(TimeDelta::MAX);
                now - last_run >= interval
            }
        }
    }

    /// Whether `now` falls in `[time_of_day, time_of_day + 5min)`, wrapping
    /// past midnight. An unparseable time of day never matches.
    pub fn is_in_time_window(time_of_day: &str, now: NaiveTime) -> bool {
        let Ok(start) = NaiveTime::parse_from_str(time_of_day.trim(), "%H:%M") else {
            warn!("Invalid time of day '{}'", time_of_day);
            return false;
        };
        let since_start = (now - start).num_seconds().rem_euclid(24 * 60 * 60);
        since_start < TIME_WINDOW.as_secs() as i64
    }

    fn spawn_task(&self, task: &TaskDefinition, now: DateTime<Utc>, trigger: TaskTrigger) -> bool {
        let Some(guard) = RunningGuard::acquire(&self.state, &task.name, now) else {
            debug!("Task {} is already running, skipping", task.name);
            return false;
        };

        let token = self
            .task_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let ctx = TaskContext::new(token, trigger, now);
        let runner = Arc::clone(&task.runner);
        let name = task.name.clone();

        info!("Starting task {} ({})", name, trigger);
        tokio::spawn(async move {
            let _guard = guard;
            let start_time = Instant::now();
            let result = runner.run(ctx).await;
            let elapsed = start_time.elapsed();

            let status = match result {
                Ok(()) => {
                    info!("Task {} completed in {:?}", name, elapsed);
                    "success"
                }
                Err(TaskError::Cancelled) => {
                    info!("Task {} was cancelled after {:?}", name, elapsed);
                    "cancelled"
                }
                Err(e) => {
                    error!("Task {} failed after {:?}: {}", name, elapsed, e);
                    "failed"
                }
            };
            metrics::record_task_execution(&name, status, elapsed);
        });
        true
    }
}

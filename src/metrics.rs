use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metric name prefix for all cardkeep metrics
const PREFIX: &str = "cardkeep";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Scheduled tasks
    pub static ref TASK_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_task_executions_total"), "Scheduled task executions"),
        &["task", "status"]
    ).expect("Failed to create task_executions_total metric");

    pub static ref TASK_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_task_duration_seconds"),
            "Scheduled task duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["task"]
    ).expect("Failed to create task_duration_seconds metric");

    pub static ref TASK_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_task_running"), "Whether a scheduled task is running (1) or idle (0)"),
        &["task"]
    ).expect("Failed to create task_running metric");

    // Imports
    pub static ref IMPORT_RECORDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_import_records_total"), "Feed records processed by imports"),
        &["dataset", "outcome"]
    ).expect("Failed to create import_records_total metric");

    pub static ref IMPORT_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_import_runs_total"), "Import runs by final status"),
        &["dataset", "status"]
    ).expect("Failed to create import_runs_total metric");

    pub static ref IMPORT_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_import_duration_seconds"),
            "Import run duration in seconds"
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["dataset"]
    ).expect("Failed to create import_duration_seconds metric");

    // Jobs and catalog
    pub static ref JOBS_CLEANED_TOTAL: Counter = Counter::with_opts(
        Opts::new(format!("{PREFIX}_jobs_cleaned_total"), "Job records removed by retention cleanup")
    ).expect("Failed to create jobs_cleaned_total metric");

    pub static ref CATALOG_ITEMS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items"), "Rows in the local catalog"),
        &["dataset"]
    ).expect("Failed to create catalog_items metric");
}

/// Registers every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    // ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(TASK_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASK_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TASK_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(IMPORT_RECORDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(IMPORT_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(IMPORT_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_CLEANED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS.clone()));
}

pub fn record_task_execution(task: &str, status: &str, duration: Duration) {
    TASK_EXECUTIONS_TOTAL
        .with_label_values(&[task, status])
        .inc();
    TASK_DURATION_SECONDS
        .with_label_values(&[task])
        .observe(duration.as_secs_f64());
}

pub fn set_task_running(task: &str, running: bool) {
    TASK_RUNNING
        .with_label_values(&[task])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_import_records(dataset: &str, succeeded: u64, failed: u64) {
    IMPORT_RECORDS_TOTAL
        .with_label_values(&[dataset, "succeeded"])
        .inc_by(succeeded as f64);
    IMPORT_RECORDS_TOTAL
        .with_label_values(&[dataset, "failed"])
        .inc_by(failed as f64);
}

pub fn record_import_run(dataset: &str, status: &str, duration: Duration) {
    IMPORT_RUNS_TOTAL
        .with_label_values(&[dataset, status])
        .inc();
    IMPORT_DURATION_SECONDS
        .with_label_values(&[dataset])
        .observe(duration.as_secs_f64());
}

pub fn record_jobs_cleaned(count: usize) {
    JOBS_CLEANED_TOTAL.inc_by(count as f64);
}

pub fn set_catalog_items(dataset: &str, count: usize) {
    CATALOG_ITEMS
        .with_label_values(&[dataset])
        .set(count as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("Failed to encode metrics"),
            )
        }
    }
}

/// Serves `/metrics` on `port` until `token` is cancelled.
pub async fn serve_metrics(port: u16, token: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .context("Metrics server failed")
}

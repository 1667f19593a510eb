//! Progress bookkeeping for a single import run.
//!
//! `ImportProgress` is what gets stored as the job's metadata blob, so its
//! serialized field names are part of the job query surface.

use super::DatasetKind;
use serde::{Deserialize, Serialize};

pub const MAX_FAILURE_EXAMPLES: usize = 10;
pub const MAX_FAILURE_MESSAGE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Queued,
    Resolving,
    Downloading,
    Importing,
    Completed,
    Failed,
}

/// Outcome of one batch, folded into [`ImportProgress`] once applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBatchResult {
    pub succeeded: u64,
    pub failed: u64,
    /// At most [`MAX_FAILURE_EXAMPLES`] messages.
    pub failure_examples: Vec<String>,
}

impl ImportBatchResult {
    pub fn record_failure(&mut self, message: impl AsRef<str>) {
        self.failed += 1;
        if self.failure_examples.len() < MAX_FAILURE_EXAMPLES {
            self.failure_examples
                .push(truncate_message(message.as_ref()));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub dataset: String,
    pub phase: ImportPhase,
    pub download_uri: Option<String>,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub failure_examples: Vec<String>,
    pub error: Option<String>,
}

impl ImportProgress {
    pub fn new(kind: DatasetKind) -> Self {
        Self {
            dataset: kind.key().to_string(),
            phase: ImportPhase::Queued,
            download_uri: None,
            processed: 0,
            succeeded: 0,
            failed: 0,
            batches: 0,
            failure_examples: Vec::new(),
            error: None,
        }
    }

    pub fn absorb(&mut self, batch: &ImportBatchResult) {
        self.batches += 1;
        self.succeeded += batch.succeeded;
        self.failed += batch.failed;
        self.processed += batch.succeeded + batch.failed;
        let room = MAX_FAILURE_EXAMPLES.saturating_sub(self.failure_examples.len());
        self.failure_examples
            .extend(batch.failure_examples.iter().take(room).cloned());
    }

    /// `failed / (failed + succeeded)`, or 0 when nothing was processed.
    pub fn failure_rate(&self) -> f64 {
        let total = self.failed + self.succeeded;
        if total == 0 {
            0.0
        } else {
            self.failed as f64 / total as f64
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Caps a failure message at [`MAX_FAILURE_MESSAGE_CHARS`] characters.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_FAILURE_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_FAILURE_MESSAGE_CHARS).collect();
    truncated.push_str("...");
    truncated
}

use thiserror::Error;

/// Fatal outcome of an import run.
///
/// Per-record conversion problems are counted in the run's progress and
/// never show up here.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("dataset '{0}' not found in catalog")]
    DatasetNotFound(String),

    #[error("malformed feed: {0}")]
    Framing(String),

    #[error(
        "failure rate {rate:.4} exceeds threshold {threshold:.4} ({failed} of {total} records failed)"
    )]
    ThresholdExceeded {
        rate: f64,
        threshold: f64,
        failed: u64,
        total: u64,
    },

    #[error("import cancelled")]
    Cancelled,

    #[error("an import of this dataset is already running")]
    AlreadyRunning,

    #[error("storage error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        ImportError::Store(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Transport(err.to_string())
    }
}

impl ImportError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Config(_) => "config",
            ImportError::Transport(_) => "transport",
            ImportError::HttpStatus { .. } => "http_status",
            ImportError::DatasetNotFound(_) => "dataset_not_found",
            ImportError::Framing(_) => "framing",
            ImportError::ThresholdExceeded { .. } => "threshold_exceeded",
            ImportError::Cancelled => "cancelled",
            ImportError::AlreadyRunning => "already_running",
            ImportError::Store(_) => "store",
        }
    }
}

//! Error types for configuration and series retrieval

use thiserror::Error;

/// Invalid or missing configuration, detected before any computation runs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend URL is required (set PROM_URL, ANOMALY_BACKEND_URL or --backend-url)")]
    MissingBackendUrl,

    #[error("invalid backend URL '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("window size must be a positive odd integer, got {0}")]
    InvalidWindowSize(usize),

    #[error("threshold must be a finite non-negative number, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("max anomalies must be at least 1")]
    InvalidMaxAnomalies,

    #[error("failed to load settings: {0}")]
    Load(String),
}

/// Any error that stops a detection run
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A sample sequence whose timestamps go backwards
#[derive(Debug, Error, PartialEq, Eq)]
#[error("sample {index} has timestamp {timestamp}, earlier than the previous {previous}")]
pub struct UnorderedSeries {
    pub index: usize,
    pub timestamp: i64,
    pub previous: i64,
}

/// Failure while retrieving a series from the monitoring backend
///
/// Any of these aborts the run; nothing is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to monitoring backend failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request to monitoring backend timed out")]
    Timeout,

    #[error("monitoring backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("monitoring backend reported status '{status}' ({error_type}): {error}")]
    BackendStatus {
        status: String,
        error_type: String,
        error: String,
    },

    #[error("malformed query_range payload: {0}")]
    MalformedPayload(String),

    #[error("failed to read saved response: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::MalformedPayload(err.to_string())
        } else {
            FetchError::Transport(err)
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedPayload(err.to_string())
    }
}

impl From<UnorderedSeries> for FetchError {
    fn from(err: UnorderedSeries) -> Self {
        FetchError::MalformedPayload(err.to_string())
    }
}

//! Time-series anomaly detection for the AIOps governance pipeline
//!
//! This crate provides the core functionality for:
//! - Fetching one metric series from a Prometheus-compatible backend
//! - Rolling-median baselines
//! - MAD-based robust scoring
//! - Thresholded, bounded anomaly reports
//! - Metrics and structured logging for detection runs

pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod models;
pub mod observability;

pub use config::DetectorConfig;
pub use detect::{Analysis, Detector};
pub use error::{ConfigError, DetectError, FetchError};
pub use fetch::{FileFetcher, PrometheusFetcher, SeriesFetcher, TimeRange};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};

//! Observability for detection runs
//!
//! Provides:
//! - Prometheus metrics (fetch latency, run duration, points, anomalies, sigma)
//!   written in text exposition format for a textfile collector
//! - Structured JSON logging with tracing

use anyhow::{Context, Result};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{AnomalyRecord, AnomalySeverity};

/// Histogram buckets for backend latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Histogram buckets for whole-run duration (in seconds)
const RUN_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

struct DetectorMetricsInner {
    registry: Registry,
    fetch_latency_seconds: Histogram,
    run_duration_seconds: Histogram,
    points_processed: IntGauge,
    anomalies_flagged: IntGauge,
    anomalies_reported: IntGauge,
    anomalies_dropped: IntGauge,
    scale_sigma: Gauge,
    fetch_errors: IntCounter,
    last_run_success: IntGauge,
    last_run_timestamp_seconds: IntGauge,
}

/// Detector metrics for Prometheus exposition
///
/// Each handle owns its registry; clones share the same metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    inner: Arc<DetectorMetricsInner>,
}

impl DetectorMetrics {
    /// Create and register all metrics in a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let fetch_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "anomaly_detector_fetch_latency_seconds",
                "Time spent fetching the series from the monitoring backend",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "anomaly_detector_run_duration_seconds",
                "Total duration of a detection run",
            )
            .buckets(RUN_BUCKETS.to_vec()),
        )?;
        let points_processed = IntGauge::new(
            "anomaly_detector_points",
            "Number of samples in the analyzed series",
        )?;
        let anomalies_flagged = IntGauge::new(
            "anomaly_detector_anomalies_flagged",
            "Points whose score reached the threshold",
        )?;
        let anomalies_reported = IntGauge::new(
            "anomaly_detector_anomalies_reported",
            "Anomalies included in the report after the cap",
        )?;
        let anomalies_dropped = IntGauge::new(
            "anomaly_detector_anomalies_dropped",
            "Flagged points removed by the report cap",
        )?;
        let scale_sigma = Gauge::new(
            "anomaly_detector_scale_sigma",
            "Global robust scale estimate (1.4826 * MAD)",
        )?;
        let fetch_errors = IntCounter::new(
            "anomaly_detector_fetch_errors_total",
            "Backend fetches that aborted the run",
        )?;
        let last_run_success = IntGauge::new(
            "anomaly_detector_last_run_success",
            "1 if the last run produced a report, 0 otherwise",
        )?;
        let last_run_timestamp_seconds = IntGauge::new(
            "anomaly_detector_last_run_timestamp_seconds",
            "Unix time at which the last run finished",
        )?;

        registry.register(Box::new(fetch_latency_seconds.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(points_processed.clone()))?;
        registry.register(Box::new(anomalies_flagged.clone()))?;
        registry.register(Box::new(anomalies_reported.clone()))?;
        registry.register(Box::new(anomalies_dropped.clone()))?;
        registry.register(Box::new(scale_sigma.clone()))?;
        registry.register(Box::new(fetch_errors.clone()))?;
        registry.register(Box::new(last_run_success.clone()))?;
        registry.register(Box::new(last_run_timestamp_seconds.clone()))?;

        Ok(Self {
            inner: Arc::new(DetectorMetricsInner {
                registry,
                fetch_latency_seconds,
                run_duration_seconds,
                points_processed,
                anomalies_flagged,
                anomalies_reported,
                anomalies_dropped,
                scale_sigma,
                fetch_errors,
                last_run_success,
                last_run_timestamp_seconds,
            }),
        })
    }

    /// Record a backend fetch latency observation
    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner.fetch_latency_seconds.observe(duration_secs);
    }

    /// Record the duration of a whole run
    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner.run_duration_seconds.observe(duration_secs);
    }

    pub fn set_points(&self, points: usize) {
        self.inner.points_processed.set(points as i64);
    }

    /// Update anomaly counts for the finished run
    pub fn set_anomalies(&self, flagged: usize, reported: usize) {
        self.inner.anomalies_flagged.set(flagged as i64);
        self.inner.anomalies_reported.set(reported as i64);
        self.inner
            .anomalies_dropped
            .set(flagged.saturating_sub(reported) as i64);
    }

    pub fn set_sigma(&self, sigma: f64) {
        self.inner.scale_sigma.set(sigma);
    }

    pub fn inc_fetch_errors(&self) {
        self.inner.fetch_errors.inc();
    }

    /// Mark the outcome of the run and when it finished
    pub fn set_last_run(&self, success: bool, finished_at: i64) {
        self.inner.last_run_success.set(i64::from(success));
        self.inner.last_run_timestamp_seconds.set(finished_at);
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }

    /// Write metrics for a node-exporter textfile collector
    ///
    /// Writes to a sibling temp file and renames it so the collector never
    /// reads a partial file.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let content = self.render()?;
        let tmp = path.with_extension("prom.tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create metrics directory")?;
            }
        }

        std::fs::write(&tmp, content).context("Failed to write metrics file")?;
        std::fs::rename(&tmp, path).context("Failed to move metrics file into place")?;
        Ok(())
    }
}

/// Structured logger for detection events
///
/// Every record carries the query it belongs to, so runs over different
/// queries can be told apart in aggregated logs.
#[derive(Clone)]
pub struct StructuredLogger {
    query: String,
}

impl StructuredLogger {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Log the start of a detection run
    pub fn log_detection_started(&self, start: i64, end: i64, step_secs: f64, scorer: &str) {
        info!(
            event = "detection_started",
            query = %self.query,
            start = start,
            end = end,
            step_secs = step_secs,
            scorer = %scorer,
            "Starting anomaly detection"
        );
    }

    /// Log the fetched series
    pub fn log_series_fetched(&self, points: usize, latency_ms: f64) {
        info!(
            event = "series_fetched",
            query = %self.query,
            points = points,
            latency_ms = latency_ms,
            "Fetched series from monitoring backend"
        );
    }

    /// Log the global scale estimate
    pub fn log_scale_estimated(&self, mad: f64, sigma: f64, floored: bool) {
        if floored {
            debug!(
                event = "scale_estimated",
                query = %self.query,
                mad = mad,
                sigma = sigma,
                floored = true,
                "Residuals have zero MAD, using floor"
            );
        } else {
            debug!(
                event = "scale_estimated",
                query = %self.query,
                mad = mad,
                sigma = sigma,
                floored = false,
                "Estimated robust scale"
            );
        }
    }

    /// Log a windowed scale estimate
    pub fn log_local_scale(&self, window: usize, floored_windows: usize) {
        debug!(
            event = "scale_estimated",
            query = %self.query,
            window = window,
            floored_windows = floored_windows,
            "Estimated windowed robust scale"
        );
    }

    /// Log one reported anomaly
    pub fn log_anomaly(&self, record: &AnomalyRecord) {
        let severity = record.severity();
        debug!(
            event = "anomaly_detected",
            query = %self.query,
            ts = record.timestamp,
            value = record.value,
            baseline = record.baseline,
            z_score = record.score,
            deviation_percent = record.deviation_percent(),
            severity = %severity,
            "Anomaly detected"
        );
    }

    /// Log flagged points removed by the cap
    pub fn log_truncated(&self, flagged: usize, reported: usize, policy: &str) {
        warn!(
            event = "anomalies_truncated",
            query = %self.query,
            flagged = flagged,
            reported = reported,
            dropped = flagged - reported,
            policy = %policy,
            "Anomaly list truncated to cap"
        );
    }

    /// Log the end of a successful run
    pub fn log_detection_completed(&self, points: usize, anomalies: &[AnomalyRecord]) {
        let critical = anomalies
            .iter()
            .filter(|a| a.severity() == AnomalySeverity::Critical)
            .count();

        info!(
            event = "detection_completed",
            query = %self.query,
            points = points,
            anomalies = anomalies.len(),
            critical = critical,
            "Anomaly detection completed"
        );
    }

    /// Log a backend failure that aborts the run
    pub fn log_fetch_failed(&self, error: &dyn std::error::Error) {
        warn!(
            event = "fetch_failed",
            query = %self.query,
            error = %error,
            "Failed to fetch series, aborting run"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detector_metrics_render() {
        let metrics = DetectorMetrics::new().unwrap();

        metrics.observe_fetch_latency(0.12);
        metrics.observe_run_duration(0.2);
        metrics.set_points(1440);
        metrics.set_anomalies(250, 200);
        metrics.set_sigma(0.5);
        metrics.set_last_run(true, 1_700_000_000);

        let text = metrics.render().unwrap();
        assert!(text.contains("anomaly_detector_points 1440"));
        assert!(text.contains("anomaly_detector_anomalies_dropped 50"));
        assert!(text.contains("anomaly_detector_last_run_success 1"));
        assert!(text.contains("anomaly_detector_fetch_latency_seconds_count 1"));
    }

    #[test]
    fn test_independent_registries() {
        // Two handles must not collide the way global registration would
        let first = DetectorMetrics::new().unwrap();
        let second = DetectorMetrics::new().unwrap();
        first.inc_fetch_errors();

        assert!(first
            .render()
            .unwrap()
            .contains("anomaly_detector_fetch_errors_total 1"));
        assert!(second
            .render()
            .unwrap()
            .contains("anomaly_detector_fetch_errors_total 0"));
    }

    #[test]
    fn test_write_textfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collector").join("anomaly.prom");

        let metrics = DetectorMetrics::new().unwrap();
        metrics.set_last_run(false, 42);
        metrics.write_textfile(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("anomaly_detector_last_run_success 0"));
        assert!(content.contains("anomaly_detector_last_run_timestamp_seconds 42"));
        assert!(!path.with_extension("prom.tmp").exists());
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("up");
        assert_eq!(logger.query, "up");
    }
}

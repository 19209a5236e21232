//! Anomaly detection pipeline
//!
//! One run is a single linear pass:
//! fetch -> rolling-median baseline -> robust scores -> thresholded, capped report.
//! The only early exit is an empty series; the only abort is a failed fetch.

mod baseline;
mod reporter;
mod scorer;
mod stats;


pub use baseline::BaselineEstimator;
pub use reporter::{AnomalyReporter, Selection, SelectionPolicy};
pub use scorer::{
    residuals, saturate, GlobalMadScorer, RobustScorer, ScaleEstimate, ScorerKind, Scores,
    WindowedMadScorer, MAD_FLOOR, MAD_TO_SIGMA,
};
pub use stats::{median, rolling_median};

use std::time::Instant;

use crate::config::DetectorConfig;
use crate::error::{ConfigError, FetchError};
use crate::fetch::{SeriesFetcher, TimeRange};
use crate::models::{Report, Series};
use crate::observability::{DetectorMetrics, StructuredLogger};

/// Outcome of analyzing one series
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub report: Report,
    /// Scale used for scoring; `None` when the series was empty
    pub scale: Option<ScaleEstimate>,
    /// Points that reached the threshold before the cap
    pub flagged: usize,
}

/// Wires the pipeline stages together for one query
pub struct Detector {
    query: String,
    estimator: BaselineEstimator,
    scorer: Box<dyn RobustScorer>,
    reporter: AnomalyReporter,
    logger: StructuredLogger,
    metrics: Option<DetectorMetrics>,
}

impl Detector {
    /// Build a detector from a configuration, validating it first
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            query: config.query.clone(),
            estimator: BaselineEstimator::new(config.window_size),
            scorer: config.scorer.build(),
            reporter: AnomalyReporter::new(config.threshold, config.max_anomalies)
                .with_selection(config.selection),
            logger: StructuredLogger::new(&config.query),
            metrics: None,
        })
    }

    /// Replace the scoring strategy
    pub fn with_scorer(mut self, scorer: Box<dyn RobustScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Record run metrics into `metrics`
    pub fn with_metrics(mut self, metrics: DetectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Score an already fetched series
    pub fn analyze(&self, series: &Series) -> Analysis {
        if series.is_empty() {
            return Analysis {
                report: Report::empty(&self.query),
                scale: None,
                flagged: 0,
            };
        }

        let baseline = self.estimator.estimate(series);
        let scores = self.scorer.score(series, &baseline);

        match scores.scale {
            ScaleEstimate::Global {
                mad,
                sigma,
                floored,
            } => self.logger.log_scale_estimated(mad, sigma, floored),
            ScaleEstimate::Local {
                window,
                floored_windows,
            } => self.logger.log_local_scale(window, floored_windows),
        }

        let selection = self.reporter.select(series, &baseline, &scores.values);
        if selection.dropped() > 0 {
            self.logger.log_truncated(
                selection.flagged,
                selection.anomalies.len(),
                &self.reporter.selection().to_string(),
            );
        }
        for record in &selection.anomalies {
            self.logger.log_anomaly(record);
        }

        Analysis {
            report: Report {
                ok: true,
                query: self.query.clone(),
                points: series.len(),
                anomalies: selection.anomalies,
            },
            scale: Some(scores.scale),
            flagged: selection.flagged,
        }
    }

    /// Fetch the series for `range` and analyze it
    ///
    /// A fetch failure aborts the run without producing a report.
    pub async fn run(
        &self,
        fetcher: &dyn SeriesFetcher,
        range: &TimeRange,
    ) -> Result<Analysis, FetchError> {
        let started = Instant::now();
        self.logger.log_detection_started(
            range.start,
            range.end,
            range.step.as_secs_f64(),
            self.scorer.name(),
        );

        let fetched = fetcher.fetch(&self.query, range).await;
        let fetch_secs = started.elapsed().as_secs_f64();

        let series = match fetched {
            Ok(series) => series,
            Err(e) => {
                self.logger.log_fetch_failed(&e);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_fetch_errors();
                    metrics.set_last_run(false, chrono::Utc::now().timestamp());
                }
                return Err(e);
            }
        };
        self.logger.log_series_fetched(series.len(), fetch_secs * 1000.0);

        let analysis = self.analyze(&series);
        self.logger.log_detection_completed(analysis.report.points, &analysis.report.anomalies);

        if let Some(metrics) = &self.metrics {
            metrics.observe_fetch_latency(fetch_secs);
            metrics.observe_run_duration(started.elapsed().as_secs_f64());
            metrics.set_points(analysis.report.points);
            metrics.set_anomalies(analysis.flagged, analysis.report.anomalies.len());
            if let Some(ScaleEstimate::Global { sigma, .. }) = analysis.scale {
                metrics.set_sigma(sigma);
            }
            metrics.set_last_run(true, chrono::Utc::now().timestamp());
        }

        Ok(analysis)
    }
}

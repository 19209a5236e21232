//! Detector configuration value object
//!
//! Built once at process start and passed by reference into every
//! component. Nothing in this crate reads the process environment.

use std::time::Duration;

use url::Url;

use crate::detect::{ScorerKind, SelectionPolicy};
use crate::error::ConfigError;
use crate::fetch::TimeRange;

/// Aggregated request rate, the usual health signal for an HTTP service
pub const DEFAULT_QUERY: &str = "sum(rate(http_server_requests_seconds_count[5m]))";

/// Robust z-score at or above which a point is anomalous
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Rolling median window (samples, odd)
pub const DEFAULT_WINDOW_SIZE: usize = 49;

/// Default sampling step sent to the backend
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

/// Default lookback (24 hours)
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard cap on reported anomalies
pub const DEFAULT_MAX_ANOMALIES: usize = 200;

/// Residual window for the windowed scorer (4 hours at a 60s step)
pub const DEFAULT_SCORER_WINDOW: usize = 241;

/// Request timeout for the backend fetch
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Monitoring backend base URL; required only when fetching over HTTP
    pub backend_url: Option<Url>,
    /// Range query, expected to aggregate down to one series
    pub query: String,
    /// Inclusive robust z-score threshold
    pub threshold: f64,
    /// Rolling median window size (odd)
    pub window_size: usize,
    /// Sampling step
    pub step: Duration,
    /// How far back from `end` the range starts
    pub lookback: Duration,
    /// Range end as unix seconds; "now" when unset
    pub end: Option<i64>,
    /// Maximum number of anomalies in the report
    pub max_anomalies: usize,
    /// Which flagged points survive the cap
    pub selection: SelectionPolicy,
    /// Scale estimation strategy
    pub scorer: ScorerKind,
    /// Backend request timeout
    pub request_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            query: DEFAULT_QUERY.to_string(),
            threshold: DEFAULT_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            step: DEFAULT_STEP,
            lookback: DEFAULT_LOOKBACK,
            end: None,
            max_anomalies: DEFAULT_MAX_ANOMALIES,
            selection: SelectionPolicy::default(),
            scorer: ScorerKind::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl DetectorConfig {
    /// Set the backend URL, validating it
    pub fn with_backend_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.backend_url = Some(parse_backend_url(url)?);
        Ok(self)
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check every numeric invariant the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window(self.window_size)?;

        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }

        if self.max_anomalies == 0 {
            return Err(ConfigError::InvalidMaxAnomalies);
        }

        if self.step.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "step",
                value: "0s".to_string(),
            });
        }

        if let ScorerKind::Windowed { window } = self.scorer {
            validate_window(window)?;
        }

        Ok(())
    }

    /// Backend URL, or the configuration error that aborts an HTTP run
    pub fn require_backend_url(&self) -> Result<&Url, ConfigError> {
        self.backend_url.as_ref().ok_or(ConfigError::MissingBackendUrl)
    }

    /// Query window ending at `end` (or `now` when no end is configured)
    pub fn time_range(&self, now: i64) -> TimeRange {
        let end = self.end.unwrap_or(now);
        let lookback = i64::try_from(self.lookback.as_secs()).unwrap_or(i64::MAX);
        TimeRange {
            start: end.saturating_sub(lookback),
            end,
            step: self.step,
        }
    }
}

/// Window sizes must be odd so the window is centered on its point
pub fn validate_window(window: usize) -> Result<(), ConfigError> {
    if window == 0 || window % 2 == 0 {
        return Err(ConfigError::InvalidWindowSize(window));
    }
    Ok(())
}

/// Parse and normalize a backend base URL
pub fn parse_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingBackendUrl);
    }

    let mut url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBackendUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBackendUrl {
            url: trimmed.to_string(),
            reason: "not a base URL".to_string(),
        });
    }

    // Joining relative paths replaces the last segment unless the path ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Parse a Prometheus-style duration ("60s", "5m", "1h30m", "1d") or plain seconds
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(secs) = s.parse::<f64>() {
        if secs <= 0.0 {
            return None;
        }
        return Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.checked_mul(60)?),
            "h" => Duration::from_secs(amount.checked_mul(60 * 60)?),
            "d" => Duration::from_secs(amount.checked_mul(24 * 60 * 60)?),
            "w" => Duration::from_secs(amount.checked_mul(7 * 24 * 60 * 60)?),
            "y" => Duration::from_secs(amount.checked_mul(365 * 24 * 60 * 60)?),
            _ => return None,
        };
        rest = &rest[unit_len..];
        total = total.checked_add(part)?;
    }

    (!total.is_zero()).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 49);
        assert_eq!(config.threshold, 3.0);
        assert_eq!(config.max_anomalies, 200);
        assert_eq!(config.selection, SelectionPolicy::First);
    }

    #[test]
    fn test_even_window_rejected() {
        let config = DetectorConfig::default().with_window_size(48);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindowSize(48))
        ));

        let zero = DetectorConfig::default().with_window_size(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_windowed_scorer_window_validated() {
        let config = DetectorConfig {
            scorer: ScorerKind::Windowed { window: 10 },
            ..DetectorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindowSize(10))
        ));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = DetectorConfig::default().with_threshold(-1.0);
        assert!(config.validate().is_err());

        let nan = DetectorConfig::default().with_threshold(f64::NAN);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_missing_backend_url() {
        let config = DetectorConfig::default();
        assert!(matches!(
            config.require_backend_url(),
            Err(ConfigError::MissingBackendUrl)
        ));
    }

    #[test]
    fn test_backend_url_gets_trailing_slash() {
        let url = parse_backend_url("http://prometheus:9090/prom").unwrap();
        assert_eq!(url.as_str(), "http://prometheus:9090/prom/");

        let root = parse_backend_url("http://prometheus:9090").unwrap();
        assert_eq!(root.as_str(), "http://prometheus:9090/");
    }

    #[test]
    fn test_invalid_backend_url() {
        assert!(matches!(
            parse_backend_url("not a url"),
            Err(ConfigError::InvalidBackendUrl { .. })
        ));
        assert!(matches!(
            parse_backend_url("   "),
            Err(ConfigError::MissingBackendUrl)
        ));
    }

    #[test]
    fn test_time_range_uses_lookback() {
        let config = DetectorConfig::default();
        let range = config.time_range(100_000);
        assert_eq!(range.end, 100_000);
        assert_eq!(range.start, 100_000 - 86_400);
        assert_eq!(range.step, Duration::from_secs(60));
    }

    #[test]
    fn test_time_range_fixed_end() {
        let config = DetectorConfig {
            end: Some(7200),
            lookback: Duration::from_secs(3600),
            ..DetectorConfig::default()
        };
        let range = config.time_range(999_999);
        assert_eq!(range.start, 3600);
        assert_eq!(range.end, 7200);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("0.5"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("-5"), None);
        assert_eq!(parse_duration("inf"), None);
        assert_eq!(parse_duration("NaN"), None);
        assert_eq!(parse_duration("1e30"), None);
        assert_eq!(parse_duration("1e20"), None);
        assert_eq!(parse_duration("1e-20"), None);
    }
}

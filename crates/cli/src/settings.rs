//! Layered settings for the detector binary
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, legacy
//! environment names, `ANOMALY_*` environment, command-line flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anomaly_lib::config::{
    parse_backend_url, parse_duration, DEFAULT_MAX_ANOMALIES, DEFAULT_QUERY,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCORER_WINDOW, DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE,
};
use anomaly_lib::detect::{ScorerKind, SelectionPolicy};
use anomaly_lib::{ConfigError, DetectorConfig};
use clap::Args;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Prefix for the current environment variable names
pub const ENV_PREFIX: &str = "ANOMALY";

/// Older deployment variable names and the keys they map to
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PROM_URL", "backend_url"),
    ("QUERY", "query"),
    ("ZSCORE", "threshold"),
    ("WINDOW", "window_size"),
    ("STEP", "step"),
];

/// Settings after all layers are merged
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub query: String,
    pub threshold: f64,
    pub window_size: usize,
    pub step: String,
    pub lookback: String,
    pub end: Option<i64>,
    pub max_anomalies: usize,
    pub selection: String,
    pub scorer: String,
    pub scorer_window: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: None,
            query: DEFAULT_QUERY.to_string(),
            threshold: DEFAULT_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            step: "60s".to_string(),
            lookback: "24h".to_string(),
            end: None,
            max_anomalies: DEFAULT_MAX_ANOMALIES,
            selection: SelectionPolicy::default().to_string(),
            scorer: "global".to_string(),
            scorer_window: DEFAULT_SCORER_WINDOW,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Detection flags; each one overrides every other settings layer
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Base URL of the Prometheus-compatible backend
    #[arg(long, value_name = "URL")]
    pub backend_url: Option<String>,

    /// PromQL expression yielding a single series
    #[arg(long, short, value_name = "PROMQL")]
    pub query: Option<String>,

    /// Minimum |z| for a point to be flagged
    #[arg(long, short = 'z', value_name = "Z")]
    pub threshold: Option<f64>,

    /// Rolling median window size (odd)
    #[arg(long = "window", short = 'w', value_name = "K")]
    pub window_size: Option<usize>,

    /// Sampling step (e.g. 60s, 5m)
    #[arg(long, value_name = "DURATION")]
    pub step: Option<String>,

    /// How far back from the end of the range to query (e.g. 24h)
    #[arg(long, value_name = "DURATION")]
    pub lookback: Option<String>,

    /// End of the range as unix seconds (defaults to now)
    #[arg(long, value_name = "UNIX_SECS")]
    pub end: Option<i64>,

    /// Maximum number of anomalies in the report
    #[arg(long, value_name = "N")]
    pub max_anomalies: Option<usize>,

    /// Which flagged points survive the cap (first, most_severe)
    #[arg(long, value_name = "POLICY")]
    pub selection: Option<String>,

    /// Scale estimate used for scoring (global, windowed)
    #[arg(long, value_name = "SCORER")]
    pub scorer: Option<String>,

    /// Window size of the windowed scorer (odd)
    #[arg(long, value_name = "N")]
    pub scorer_window: Option<usize>,

    /// Backend request timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Merge every layer using the process environment
    ///
    /// Without an explicit file, `~/.config/aiops-anomaly/config.toml` is read
    /// when it exists.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let file = match config_file {
            Some(path) => Some((path.to_path_buf(), true)),
            None => default_config_path().map(|path| (path, false)),
        };
        Self::load_from(file, &env, overrides)
    }

    /// Merge every layer from explicit inputs
    ///
    /// `file` is a path plus whether it must exist.
    pub fn load_from(
        file: Option<(PathBuf, bool)>,
        env: &HashMap<String, String>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some((path, required)) = file {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }

        let legacy: config::Map<String, String> = LEGACY_ENV
            .iter()
            .filter_map(|(name, key)| env.get(*name).map(|v| (key.to_string(), v.clone())))
            .collect();
        let prefixed_key = format!("{}_", ENV_PREFIX);
        let prefixed: config::Map<String, String> = env
            .iter()
            .filter(|(name, _)| name.starts_with(&prefixed_key))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        builder = builder
            .add_source(Environment::default().source(Some(legacy)).try_parsing(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .source(Some(prefixed))
                    .try_parsing(true),
            );

        builder = builder
            .set_override_option("backend_url", overrides.backend_url.clone())
            .and_then(|b| b.set_override_option("query", overrides.query.clone()))
            .and_then(|b| b.set_override_option("threshold", overrides.threshold))
            .and_then(|b| b.set_override_option("window_size", overrides.window_size.map(as_i64)))
            .and_then(|b| b.set_override_option("step", overrides.step.clone()))
            .and_then(|b| b.set_override_option("lookback", overrides.lookback.clone()))
            .and_then(|b| b.set_override_option("end", overrides.end))
            .and_then(|b| {
                b.set_override_option("max_anomalies", overrides.max_anomalies.map(as_i64))
            })
            .and_then(|b| b.set_override_option("selection", overrides.selection.clone()))
            .and_then(|b| b.set_override_option("scorer", overrides.scorer.clone()))
            .and_then(|b| {
                b.set_override_option("scorer_window", overrides.scorer_window.map(as_i64))
            })
            .and_then(|b| {
                b.set_override_option("timeout_secs", overrides.timeout_secs.map(as_i64))
            })
            .map_err(load_error)?;

        builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(load_error)
    }

    /// Convert into a validated detector configuration
    pub fn into_detector_config(self) -> Result<DetectorConfig, ConfigError> {
        let backend_url = match self.backend_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_backend_url(raw)?),
            _ => None,
        };

        let step = duration("step", &self.step)?;
        let lookback = duration("lookback", &self.lookback)?;

        let selection = self
            .selection
            .parse::<SelectionPolicy>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "selection",
                value: self.selection.clone(),
            })?;

        let scorer = ScorerKind::parse(&self.scorer, self.scorer_window).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "scorer",
                value: self.scorer.clone(),
            }
        })?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                value: "0".to_string(),
            });
        }

        let config = DetectorConfig {
            backend_url,
            query: self.query,
            threshold: self.threshold,
            window_size: self.window_size,
            step,
            lookback,
            end: self.end,
            max_anomalies: self.max_anomalies,
            selection,
            scorer,
            request_timeout: Duration::from_secs(self.timeout_secs),
        };
        config.validate()?;

        Ok(config)
    }
}

/// `~/.config/aiops-anomaly/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".config").join("aiops-anomaly").join("config.toml"))
}

fn duration(field: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: raw.to_string(),
    })
}

fn as_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

fn load_error(err: config::ConfigError) -> ConfigError {
    ConfigError::Load(err.to_string())
}

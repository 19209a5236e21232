//! Robust deviation scoring
//!
//! Residuals against the baseline are normalized by a scale derived from the
//! median absolute deviation (MAD). `1.4826 * MAD` estimates the standard
//! deviation of Gaussian residuals without being dragged by the outliers we
//! are trying to find.

use super::stats::{median, rolling_median};
use crate::models::Series;

/// Substituted for a zero MAD so scores stay finite
pub const MAD_FLOOR: f64 = 1e-9;

/// Consistency constant turning MAD into a standard deviation estimate
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Scale used to normalize residuals
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleEstimate {
    /// One sigma for the whole series
    Global {
        mad: f64,
        sigma: f64,
        /// MAD was zero and the floor was substituted
        floored: bool,
    },
    /// Sigma recomputed per point over a residual window
    Local {
        window: usize,
        floored_windows: usize,
    },
}

/// Per-point scores and the scale they were computed with
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub values: Vec<f64>,
    pub scale: ScaleEstimate,
}

/// Strategy that turns raw and baseline series into per-point scores
///
/// `raw` and `baseline` are always the same length with matching timestamps.
pub trait RobustScorer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Score every point of `raw` against `baseline`
    fn score(&self, raw: &Series, baseline: &Series) -> Scores;
}

/// Which scorer a detector should build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScorerKind {
    #[default]
    Global,
    Windowed {
        window: usize,
    },
}

impl ScorerKind {
    /// Resolve a scorer name ("global" or "windowed")
    pub fn parse(name: &str, window: usize) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "global" => Some(ScorerKind::Global),
            "windowed" | "local" => Some(ScorerKind::Windowed { window }),
            _ => None,
        }
    }

    pub fn build(&self) -> Box<dyn RobustScorer> {
        match *self {
            ScorerKind::Global => Box::new(GlobalMadScorer),
            ScorerKind::Windowed { window } => Box::new(WindowedMadScorer::new(window)),
        }
    }
}

/// `raw[i] - baseline[i]` for every point
pub fn residuals(raw: &Series, baseline: &Series) -> Vec<f64> {
    debug_assert_eq!(raw.len(), baseline.len());
    raw.iter()
        .zip(baseline.iter())
        .map(|(r, b)| saturate(r.value - b.value))
        .collect()
}

/// Clamp an overflowed value to the largest finite float of the same sign
///
/// Scores must stay finite: JSON has no representation for infinity.
pub fn saturate(value: f64) -> f64 {
    value.clamp(-f64::MAX, f64::MAX)
}

/// Sigma from a MAD value, applying the zero floor
fn sigma_from_mad(mad: f64) -> (f64, bool) {
    if mad == 0.0 {
        (MAD_TO_SIGMA * MAD_FLOOR, true)
    } else {
        (saturate(MAD_TO_SIGMA * mad), false)
    }
}

/// Score guarded against a zero scale and against overflow
fn normalize(residual: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        0.0
    } else {
        saturate(residual / sigma)
    }
}

/// Single MAD over all residuals, applied uniformly
///
/// The MAD is taken around zero rather than around the residuals' own
/// median: the baseline already is the expected center.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMadScorer;

impl RobustScorer for GlobalMadScorer {
    fn name(&self) -> &'static str {
        "global_mad"
    }

    fn score(&self, raw: &Series, baseline: &Series) -> Scores {
        let diffs = residuals(raw, baseline);
        let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
        let mad = median(&abs).unwrap_or(0.0);
        let (sigma, floored) = sigma_from_mad(mad);

        Scores {
            values: diffs.iter().map(|d| normalize(*d, sigma)).collect(),
            scale: ScaleEstimate::Global {
                mad,
                sigma,
                floored,
            },
        }
    }
}

/// MAD recomputed over a centered window of residuals
///
/// Tracks volatility that changes within one run, at the cost of being
/// less sensitive inside long noisy stretches.
#[derive(Debug, Clone, Copy)]
pub struct WindowedMadScorer {
    window: usize,
}

impl WindowedMadScorer {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl RobustScorer for WindowedMadScorer {
    fn name(&self) -> &'static str {
        "windowed_mad"
    }

    fn score(&self, raw: &Series, baseline: &Series) -> Scores {
        let diffs = residuals(raw, baseline);
        let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
        let local_mad = rolling_median(&abs, self.window);

        let mut floored_windows = 0;
        let values = diffs
            .iter()
            .zip(local_mad.iter())
            .map(|(d, mad)| {
                let (sigma, floored) = sigma_from_mad(*mad);
                if floored {
                    floored_windows += 1;
                }
                normalize(*d, sigma)
            })
            .collect();

        Scores {
            values,
            scale: ScaleEstimate::Local {
                window: self.window,
                floored_windows,
            },
        }
    }
}

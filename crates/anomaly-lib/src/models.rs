//! Core data models for the anomaly detection engine

use serde::{Deserialize, Serialize};

use crate::error::UnorderedSeries;

/// A single observation: unix timestamp in seconds and its value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Sample {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// Samples ordered by non-decreasing timestamp
///
/// Rolling windows operate on index position, so spacing between
/// timestamps is assumed to be roughly uniform but is never checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Build a series, rejecting samples whose timestamps go backwards
    pub fn new(samples: Vec<Sample>) -> Result<Self, UnorderedSeries> {
        for (index, pair) in samples.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(UnorderedSeries {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                    previous: pair[0].timestamp,
                });
            }
        }
        Ok(Self { samples })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.samples.iter().map(|s| s.timestamp)
    }

    /// Replace every value while keeping timestamps, used to derive aligned series
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.samples.len());
        let samples = self
            .samples
            .iter()
            .zip(values)
            .map(|(s, value)| Sample::new(s.timestamp, value))
            .collect();
        Self { samples }
    }
}

impl TryFrom<Vec<(i64, f64)>> for Series {
    type Error = UnorderedSeries;

    fn try_from(pairs: Vec<(i64, f64)>) -> Result<Self, Self::Error> {
        Series::new(pairs.into_iter().map(Sample::from).collect())
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// A point whose score reached the configured threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "val")]
    pub value: f64,
    #[serde(rename = "base")]
    pub baseline: f64,
    #[serde(rename = "z")]
    pub score: f64,
}

impl AnomalyRecord {
    /// Severity level based on the absolute score
    pub fn severity(&self) -> AnomalySeverity {
        let magnitude = self.score.abs();
        if magnitude >= 5.0 {
            AnomalySeverity::Critical
        } else if magnitude >= 4.0 {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Warning
        }
    }

    /// Percentage above (or below, when negative) the baseline value
    pub fn deviation_percent(&self) -> f64 {
        if self.baseline.abs() < f64::EPSILON {
            return 0.0;
        }
        ((self.value - self.baseline) / self.baseline) * 100.0
    }
}

/// Severity levels for anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalySeverity {
    Warning,
    High,
    Critical,
}

impl std::fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalySeverity::Warning => write!(f, "warning"),
            AnomalySeverity::High => write!(f, "high"),
            AnomalySeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Result of one detection run, serialized as the tool's output document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub ok: bool,
    pub query: String,
    /// Finite samples analyzed; `NaN` and `±Inf` samples from the backend are not counted
    pub points: usize,
    pub anomalies: Vec<AnomalyRecord>,
}

impl Report {
    /// Report for a run whose backend returned no samples
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            ok: true,
            query: query.into(),
            points: 0,
            anomalies: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_rejects_backwards_timestamps() {
        let err = Series::try_from(vec![(0, 1.0), (60, 1.0), (30, 1.0)]).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.timestamp, 30);
        assert_eq!(err.previous, 60);
    }

    #[test]
    fn test_series_accepts_repeated_timestamps() {
        let series = Series::try_from(vec![(0, 1.0), (0, 2.0), (60, 3.0)]).unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_anomaly_record_serializes_short_keys() {
        let record = AnomalyRecord {
            timestamp: 180,
            value: 100.0,
            baseline: 10.0,
            score: 4.5,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"ts":180,"val":100.0,"base":10.0,"z":4.5}"#);
    }

    #[test]
    fn test_report_field_order() {
        let report = Report::empty("up");
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"ok":true,"query":"up","points":0,"anomalies":[]}"#);
    }

    #[test]
    fn test_severity_uses_magnitude() {
        let record = AnomalyRecord {
            timestamp: 0,
            value: 0.0,
            baseline: 10.0,
            score: -5.5,
        };
        assert_eq!(record.severity(), AnomalySeverity::Critical);

        let high = AnomalyRecord {
            score: 4.2,
            ..record
        };
        assert_eq!(high.severity(), AnomalySeverity::High);

        let warning = AnomalyRecord {
            score: 3.0,
            ..record
        };
        assert_eq!(warning.severity(), AnomalySeverity::Warning);
    }

    #[test]
    fn test_deviation_percent_zero_baseline() {
        let record = AnomalyRecord {
            timestamp: 0,
            value: 5.0,
            baseline: 0.0,
            score: 10.0,
        };
        assert_eq!(record.deviation_percent(), 0.0);
    }
}

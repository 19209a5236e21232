//! Anomaly selection
//!
//! Flags points whose absolute score reaches the threshold and bounds the
//! result set. Output is always in timestamp order.

use std::str::FromStr;

use crate::models::{AnomalyRecord, Series};

/// Which flagged points survive the cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// First N flagged points in timestamp order
    ///
    /// Can drop the most severe anomalies when they occur late in the range.
    #[default]
    First,
    /// N flagged points with the largest absolute score, earlier wins ties
    MostSevere,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first" => Ok(SelectionPolicy::First),
            "most_severe" => Ok(SelectionPolicy::MostSevere),
            other => Err(format!(
                "unknown selection policy '{}' (expected first or most_severe)",
                other
            )),
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::First => write!(f, "first"),
            SelectionPolicy::MostSevere => write!(f, "most_severe"),
        }
    }
}

/// Flagged points after applying the cap
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Reported anomalies, timestamp order
    pub anomalies: Vec<AnomalyRecord>,
    /// How many points reached the threshold before the cap
    pub flagged: usize,
}

impl Selection {
    pub fn dropped(&self) -> usize {
        self.flagged - self.anomalies.len()
    }
}

/// Thresholds scores and bounds the anomaly list
#[derive(Debug, Clone)]
pub struct AnomalyReporter {
    threshold: f64,
    max_anomalies: usize,
    selection: SelectionPolicy,
}

impl AnomalyReporter {
    pub fn new(threshold: f64, max_anomalies: usize) -> Self {
        Self {
            threshold,
            max_anomalies,
            selection: SelectionPolicy::First,
        }
    }

    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> SelectionPolicy {
        self.selection
    }

    /// Inclusive threshold on the absolute score
    pub fn is_anomalous(&self, score: f64) -> bool {
        score.abs() >= self.threshold
    }

    /// Collect flagged points from aligned raw/baseline/score sequences
    pub fn select(&self, raw: &Series, baseline: &Series, scores: &[f64]) -> Selection {
        debug_assert_eq!(raw.len(), baseline.len());
        debug_assert_eq!(raw.len(), scores.len());

        let flagged: Vec<AnomalyRecord> = raw
            .iter()
            .zip(baseline.iter())
            .zip(scores.iter())
            .filter(|(_, score)| self.is_anomalous(**score))
            .map(|((r, b), score)| AnomalyRecord {
                timestamp: r.timestamp,
                value: r.value,
                baseline: b.value,
                score: *score,
            })
            .collect();

        let total = flagged.len();
        let anomalies = match self.selection {
            SelectionPolicy::First => flagged.into_iter().take(self.max_anomalies).collect(),
            SelectionPolicy::MostSevere => self.most_severe(flagged),
        };

        Selection {
            anomalies,
            flagged: total,
        }
    }

    fn most_severe(&self, flagged: Vec<AnomalyRecord>) -> Vec<AnomalyRecord> {
        if flagged.len() <= self.max_anomalies {
            return flagged;
        }

        let mut ranked: Vec<usize> = (0..flagged.len()).collect();
        // Stable sort keeps the earlier point first among equal magnitudes
        ranked.sort_by(|a, b| flagged[*b].score.abs().total_cmp(&flagged[*a].score.abs()));
        ranked.truncate(self.max_anomalies);
        ranked.sort_unstable();

        ranked.into_iter().map(|i| flagged[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_series(n: usize, value: f64) -> Series {
        Series::try_from((0..n).map(|i| (i as i64 * 60, value)).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let reporter = AnomalyReporter::new(3.0, 200);
        assert!(reporter.is_anomalous(3.0));
        assert!(reporter.is_anomalous(-3.0));
        assert!(!reporter.is_anomalous(2.999));
        assert!(!reporter.is_anomalous(f64::NAN));
    }

    #[test]
    fn test_negative_scores_flagged() {
        let raw = flat_series(3, 1.0);
        let baseline = flat_series(3, 1.0);
        let selection = AnomalyReporter::new(3.0, 200).select(&raw, &baseline, &[0.0, -4.0, 1.0]);

        assert_eq!(selection.flagged, 1);
        assert_eq!(selection.anomalies[0].timestamp, 60);
        assert_eq!(selection.anomalies[0].score, -4.0);
    }

    #[test]
    fn test_cap_keeps_first_by_timestamp() {
        let raw = flat_series(250, 1.0);
        let baseline = flat_series(250, 0.0);
        // Severity grows with time, so the most severe points are the last ones
        let scores: Vec<f64> = (0..250).map(|i| 10.0 + i as f64).collect();

        let selection = AnomalyReporter::new(3.0, 200).select(&raw, &baseline, &scores);

        assert_eq!(selection.flagged, 250);
        assert_eq!(selection.anomalies.len(), 200);
        assert_eq!(selection.dropped(), 50);
        for (i, record) in selection.anomalies.iter().enumerate() {
            assert_eq!(record.timestamp, i as i64 * 60);
        }
    }

    #[test]
    fn test_most_severe_policy_keeps_largest_in_time_order() {
        let raw = flat_series(250, 1.0);
        let baseline = flat_series(250, 0.0);
        let scores: Vec<f64> = (0..250).map(|i| 10.0 + i as f64).collect();

        let selection = AnomalyReporter::new(3.0, 200)
            .with_selection(SelectionPolicy::MostSevere)
            .select(&raw, &baseline, &scores);

        assert_eq!(selection.anomalies.len(), 200);
        assert_eq!(selection.anomalies[0].timestamp, 50 * 60);
        assert_eq!(selection.anomalies[199].timestamp, 249 * 60);
        assert!(selection
            .anomalies
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_most_severe_ties_prefer_earlier() {
        let raw = flat_series(4, 1.0);
        let baseline = flat_series(4, 0.0);
        let scores = [5.0, -5.0, 5.0, 4.0];

        let selection = AnomalyReporter::new(3.0, 2)
            .with_selection(SelectionPolicy::MostSevere)
            .select(&raw, &baseline, &scores);

        let timestamps: Vec<i64> = selection.anomalies.iter().map(|a| a.timestamp).collect();
        assert_eq!(timestamps, vec![0, 60]);
    }

    #[test]
    fn test_selection_policy_from_str() {
        assert_eq!("first".parse::<SelectionPolicy>(), Ok(SelectionPolicy::First));
        assert_eq!(
            "most-severe".parse::<SelectionPolicy>(),
            Ok(SelectionPolicy::MostSevere)
        );
        assert_eq!(
            "MOST_SEVERE".parse::<SelectionPolicy>(),
            Ok(SelectionPolicy::MostSevere)
        );
        assert!("worst".parse::<SelectionPolicy>().is_err());
    }

    #[test]
    fn test_reporter_exposes_selection() {
        let reporter = AnomalyReporter::new(3.0, 200);
        assert_eq!(reporter.selection(), SelectionPolicy::First);

        let severe = reporter.with_selection(SelectionPolicy::MostSevere);
        assert_eq!(severe.selection(), SelectionPolicy::MostSevere);
        assert_eq!(severe.selection().to_string(), "most_severe");
    }
}

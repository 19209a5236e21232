//! Rolling-median baseline
//!
//! Replaces every sample with the median of the `K` samples centered on it,
//! producing the "expected" series that residuals are measured against.
//! Isolated spikes do not move a median, so they stand out in the residuals.

use super::stats::rolling_median;
use crate::models::Series;

/// Produces a timestamp-aligned baseline from a raw series
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    window_size: usize,
}

impl BaselineEstimator {
    /// Create an estimator with the given (odd) window size
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Baseline with one point per input point and identical timestamps
    pub fn estimate(&self, series: &Series) -> Series {
        let values: Vec<f64> = series.values().collect();
        let medians = rolling_median(&values, self.window_size);
        series.with_values(medians)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Series {
        Series::try_from(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as i64 * 60, *v))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn test_baseline_is_aligned() {
        let raw = series(&[1.0, 5.0, 2.0, 8.0, 3.0, 3.0, 9.0]);
        let baseline = BaselineEstimator::new(3).estimate(&raw);

        assert_eq!(baseline.len(), raw.len());
        for (r, b) in raw.iter().zip(baseline.iter()) {
            assert_eq!(r.timestamp, b.timestamp);
        }
    }

    #[test]
    fn test_window_larger_than_series() {
        // K = 5, n = 3: every window covers the whole series
        let raw = series(&[4.0, 1.0, 7.0]);
        let baseline = BaselineEstimator::new(5).estimate(&raw);
        let values: Vec<f64> = baseline.values().collect();
        assert_eq!(values, vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_even_boundary_window_averages_middle_values() {
        // K = 5, n = 4: index 0 sees [0..=2], index 3 sees [1..=3]
        let raw = series(&[1.0, 2.0, 3.0, 10.0]);
        let baseline = BaselineEstimator::new(5).estimate(&raw);
        let values: Vec<f64> = baseline.values().collect();
        assert_eq!(values, vec![2.0, 2.5, 2.5, 3.0]);
    }

    #[test]
    fn test_spike_does_not_move_baseline() {
        let raw = series(&[10.0, 10.0, 10.0, 100.0, 10.0, 10.0]);
        let baseline = BaselineEstimator::new(3).estimate(&raw);
        assert!(baseline.values().all(|v| v == 10.0));
    }

    #[test]
    fn test_empty_series() {
        let baseline = BaselineEstimator::new(49).estimate(&Series::empty());
        assert!(baseline.is_empty());
    }
}

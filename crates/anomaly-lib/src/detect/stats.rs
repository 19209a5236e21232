//! Median helpers shared by the baseline estimator and the scorers

use std::cmp::Ordering;

/// Median of an already sorted slice; two middle values are averaged
pub fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        Some(sorted[mid])
    } else {
        // Halve before adding so two large values cannot overflow
        Some(sorted[mid - 1] / 2.0 + sorted[mid] / 2.0)
    }
}

/// Median of arbitrary values (copies and sorts)
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_of_sorted(&sorted)
}

/// Rolling median over a centered window of `window_size` samples
///
/// The window for index `i` covers `[i - h, i + h]` clamped to the slice,
/// with `h = window_size / 2`, so it shrinks near both ends. The window is
/// kept sorted between steps: each step inserts the entering value and
/// removes the leaving one with a binary search.
pub fn rolling_median(values: &[f64], window_size: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }

    let half = window_size / 2;
    let mut window: Vec<f64> = Vec::with_capacity(window_size.min(n));
    // Window currently holds values[lo..hi]
    let mut lo = 0;
    let mut hi = 0;

    for i in 0..n {
        let upper = i.saturating_add(half).min(n - 1) + 1;
        while hi < upper {
            insert_sorted(&mut window, values[hi]);
            hi += 1;
        }

        let lower = i.saturating_sub(half);
        while lo < lower {
            remove_sorted(&mut window, values[lo]);
            lo += 1;
        }

        if let Some(m) = median_of_sorted(&window) {
            out.push(m);
        }
    }

    out
}

fn insert_sorted(window: &mut Vec<f64>, value: f64) {
    let pos = window.partition_point(|x| x.total_cmp(&value) == Ordering::Less);
    window.insert(pos, value);
}

fn remove_sorted(window: &mut Vec<f64>, value: f64) {
    let pos = window.partition_point(|x| x.total_cmp(&value) == Ordering::Less);
    debug_assert!(pos < window.len() && window[pos].total_cmp(&value) == Ordering::Equal);
    if pos < window.len() {
        window.remove(pos);
    }
}

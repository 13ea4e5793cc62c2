//! Sliding-window median with NaN-aware truncated edges

/// Sorted multiset of the finite values currently inside a window
#[derive(Debug, Default)]
pub struct SortedWindow {
    values: Vec<f64>,
}

impl SortedWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// NaN values are ignored
    pub fn insert(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let pos = self.values.partition_point(|v| *v < value);
        self.values.insert(pos, value);
    }

    pub fn remove(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let pos = self.values.partition_point(|v| *v < value);
        if pos < self.values.len() && self.values[pos] == value {
            self.values.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Median of the finite values, NaN when there are none
    pub fn median(&self) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n % 2 == 1 {
            self.values[n / 2]
        } else {
            (self.values[n / 2 - 1] + self.values[n / 2]) / 2.0
        }
    }
}

/// Centered rolling median of width `window`.
///
/// Position `i` covers `[i + (window-1)/2 + 1 - window, i + (window-1)/2]`,
/// clipped to the series. Missing values are skipped; a window with no
/// finite values yields NaN. For even widths the extra sample sits before `i`.
pub fn rolling_median_centered(samples: &[f64], window: usize) -> Vec<f64> {
    let n = samples.len();
    if n == 0 || window == 0 {
        return vec![f64::NAN; n];
    }

    let ahead = (window - 1) / 2;
    let behind = window - 1 - ahead;
    let mut sorted = SortedWindow::with_capacity(window);
    let mut out = Vec::with_capacity(n);

    // Prime with everything the first position can see ahead of itself
    for &v in samples.iter().take(ahead.min(n - 1) + 1) {
        sorted.insert(v);
    }

    for i in 0..n {
        if i > 0 {
            let incoming = i + ahead;
            if incoming < n {
                sorted.insert(samples[incoming]);
            }
            if i > behind {
                sorted.remove(samples[i - behind - 1]);
            }
        }
        out.push(sorted.median());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(samples: &[f64], window: usize) -> Vec<f64> {
        let ahead = (window - 1) / 2;
        let behind = window - 1 - ahead;
        (0..samples.len())
            .map(|i| {
                let lo = i.saturating_sub(behind);
                let hi = (i + ahead).min(samples.len() - 1);
                let mut w = SortedWindow::default();
                for &v in &samples[lo..=hi] {
                    w.insert(v);
                }
                w.median()
            })
            .collect()
    }

    fn assert_same(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-12, "{x} != {y}");
        }
    }

    #[test]
    fn test_sorted_window_median() {
        let mut w = SortedWindow::default();
        assert!(w.median().is_nan());
        for v in [5.0, 1.0, 3.0] {
            w.insert(v);
        }
        assert_eq!(w.median(), 3.0);
        w.insert(f64::NAN);
        assert_eq!(w.len(), 3);
        w.insert(7.0);
        assert_eq!(w.median(), 4.0);
        w.remove(1.0);
        assert_eq!(w.median(), 5.0);
    }

    #[test]
    fn test_odd_window_matches_brute_force() {
        let samples: Vec<f64> = (0..60).map(|i| ((i * 37) % 17) as f64).collect();
        assert_same(&rolling_median_centered(&samples, 9), &brute_force(&samples, 9));
    }

    #[test]
    fn test_even_window_matches_brute_force() {
        let samples: Vec<f64> = (0..700).map(|i| 90.0 + ((i * 13) % 11) as f64).collect();
        assert_same(&rolling_median_centered(&samples, 300), &brute_force(&samples, 300));
    }

    #[test]
    fn test_missing_values_skipped() {
        let samples = [1.0, f64::NAN, 3.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN];
        let out = rolling_median_centered(&samples, 3);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 2.0);
        assert_eq!(out[2], 3.0);
        assert_eq!(out[3], 3.0);
        assert!(out[5].is_nan());
    }

    #[test]
    fn test_window_larger_than_series() {
        let samples = [4.0, 2.0, 9.0];
        let out = rolling_median_centered(&samples, 9);
        assert_eq!(out, vec![4.0, 4.0, 4.0]);
    }
}

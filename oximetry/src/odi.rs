//! Oxygen desaturation index against a rolling-median baseline

use serde::{Deserialize, Serialize};

use crate::cleaner::CleanedSeries;
use crate::rolling::rolling_median_centered;

/// Baseline window length in seconds
const BASELINE_WINDOW_SECONDS: usize = 5 * 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesaturationCounter {
    pub sampling_rate: u32,
    /// Minimum depth below baseline, in percentage points
    pub drop_threshold_pct: f64,
    /// Minimum event length in seconds
    pub min_duration_s: u32,
}

impl Default for DesaturationCounter {
    fn default() -> Self {
        Self {
            sampling_rate: 1,
            drop_threshold_pct: 3.0,
            min_duration_s: 10,
        }
    }
}

impl DesaturationCounter {
    pub fn new(sampling_rate: u32, drop_threshold_pct: f64, min_duration_s: u32) -> Self {
        Self {
            sampling_rate,
            drop_threshold_pct,
            min_duration_s,
        }
    }

    /// Count non-overlapping desaturation events
    pub fn count_events(&self, values: &[f64]) -> usize {
        if values.is_empty() || self.sampling_rate == 0 {
            return 0;
        }
        let rate = self.sampling_rate as usize;
        let baseline = rolling_median_centered(values, BASELINE_WINDOW_SECONDS * rate);
        let min_run = (self.min_duration_s as usize * rate).max(1);

        let mut events = 0;
        let mut run = 0;
        for (value, base) in values.iter().zip(&baseline) {
            if base - value >= self.drop_threshold_pct {
                run += 1;
            } else {
                if run >= min_run {
                    events += 1;
                }
                run = 0;
            }
        }
        if run >= min_run {
            events += 1;
        }
        events
    }

    /// Events per hour; NaN when the series has no duration
    pub fn odi(&self, series: &CleanedSeries) -> f64 {
        self.odi_values(series.values())
    }

    pub fn odi_values(&self, values: &[f64]) -> f64 {
        if values.is_empty() || self.sampling_rate == 0 {
            return f64::NAN;
        }
        let hours = values.len() as f64 / (self.sampling_rate as f64 * 3600.0);
        self.count_events(values) as f64 / hours
    }
}

pub fn count_odi(series: &CleanedSeries, sampling_rate: u32, drop_threshold_pct: f64, min_duration_s: u32) -> f64 {
    DesaturationCounter::new(sampling_rate, drop_threshold_pct, min_duration_s).odi(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_hour_with_drop(drop_seconds: usize) -> CleanedSeries {
        let mut values = vec![100.0; 3600];
        for v in &mut values[1800..1800 + drop_seconds] {
            *v = 90.0;
        }
        CleanedSeries::from_values(values).unwrap()
    }

    #[test]
    fn test_single_long_drop_counts_one_event() {
        assert_eq!(count_odi(&flat_hour_with_drop(15), 1, 3.0, 10), 1.0);
    }

    #[test]
    fn test_short_drop_is_ignored() {
        assert_eq!(count_odi(&flat_hour_with_drop(5), 1, 3.0, 10), 0.0);
    }

    #[test]
    fn test_exact_minimum_duration_counts() {
        let counter = DesaturationCounter::default();
        assert_eq!(counter.count_events(flat_hour_with_drop(10).values()), 1);
        assert_eq!(counter.count_events(flat_hour_with_drop(9).values()), 0);
    }

    #[test]
    fn test_rate_scales_to_events_per_hour() {
        // two events in two hours
        let mut values = vec![97.0; 7200];
        for start in [1000, 5000] {
            for v in &mut values[start..start + 20] {
                *v = 92.0;
            }
        }
        let series = CleanedSeries::from_values(values).unwrap();
        assert_eq!(DesaturationCounter::default().odi(&series), 1.0);
    }

    #[test]
    fn test_trailing_run_is_counted() {
        let mut values = vec![98.0; 3600];
        for v in &mut values[3580..] {
            *v = 90.0;
        }
        assert_eq!(DesaturationCounter::default().count_events(&values), 1);
    }

    #[test]
    fn test_empty_series_is_nan() {
        assert!(DesaturationCounter::default().odi_values(&[]).is_nan());
    }
}

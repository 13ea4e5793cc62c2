//! Built-in biomarker panel over a cleaned series

use std::collections::VecDeque;

use oximetry::{stats, CleanedSeries};
use shared::FeatureVector;

use crate::traits::BiomarkerEngine;

const BASE_FEATURES: [&str; 9] = ["AV", "MED", "Min", "SD", "RG", "P01", "T90", "T95", "ZC"];
const COMPLEX_FEATURES: [&str; 2] = ["ODI3_engine", "DI"];

/// Running-maximum window for the engine's desaturation baseline, seconds
const ODI_BASELINE_SECONDS: usize = 120;
const ODI_DROP_PCT: f64 = 3.0;
const ODI_MIN_SECONDS: usize = 10;
/// Interval averaged for the delta index, seconds
const DELTA_INDEX_INTERVAL: usize = 12;

/// General SpO2 statistics, plus desaturation and variability measures when
/// `complex_features` is enabled
#[derive(Debug, Clone, Default)]
pub struct StatisticalBiomarkerEngine {
    complex_features: bool,
}

impl StatisticalBiomarkerEngine {
    pub fn new(complex_features: bool) -> Self {
        Self { complex_features }
    }
}

impl BiomarkerEngine for StatisticalBiomarkerEngine {
    fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| s.to_string()).collect();
        if self.complex_features {
            names.extend(COMPLEX_FEATURES.iter().map(|s| s.to_string()));
        }
        names
    }

    fn compute(&self, series: &CleanedSeries) -> FeatureVector {
        let v = series.values();
        let or_nan = |x: Option<f64>| x.unwrap_or(f64::NAN);

        let mut features = FeatureVector::new();
        features.insert("AV", or_nan(stats::mean(v)));
        features.insert("MED", or_nan(stats::median(v)));
        features.insert("Min", or_nan(stats::min(v)));
        features.insert("SD", or_nan(stats::std_dev(v)));
        features.insert("RG", or_nan(stats::max(v).zip(stats::min(v)).map(|(hi, lo)| hi - lo)));
        features.insert("P01", or_nan(stats::percentile(v, 1.0)));
        features.insert("T90", or_nan(stats::percent_below(v, 90.0)));
        features.insert("T95", or_nan(stats::percent_below(v, 95.0)));
        features.insert("ZC", or_nan(stats::mean_crossings(v).map(|c| c as f64)));

        if self.complex_features {
            features.insert("ODI3_engine", running_max_odi(v));
            features.insert("DI", delta_index(v));
        }
        features
    }
}

/// Desaturations per hour against the maximum of the preceding two minutes
fn running_max_odi(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    // Monotonic deque of indices with decreasing values
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut events = 0usize;
    let mut run = 0usize;
    for (i, &value) in values.iter().enumerate() {
        while window.back().is_some_and(|&j| values[j] <= value) {
            window.pop_back();
        }
        window.push_back(i);
        while window.front().is_some_and(|&j| j + ODI_BASELINE_SECONDS <= i) {
            window.pop_front();
        }
        let baseline = window.front().map_or(value, |&j| values[j]);

        if baseline - value >= ODI_DROP_PCT {
            run += 1;
        } else {
            if run >= ODI_MIN_SECONDS {
                events += 1;
            }
            run = 0;
        }
    }
    if run >= ODI_MIN_SECONDS {
        events += 1;
    }

    events as f64 / (values.len() as f64 / 3600.0)
}

/// Mean absolute change between consecutive interval means
fn delta_index(values: &[f64]) -> f64 {
    let means: Vec<f64> = values
        .chunks(DELTA_INDEX_INTERVAL)
        .filter(|c| c.len() == DELTA_INDEX_INTERVAL)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect();
    if means.len() < 2 {
        return f64::NAN;
    }
    let total: f64 = means.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (means.len() - 1) as f64
}

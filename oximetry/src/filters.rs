//! Individual cleaning steps
//!
//! Each step takes and returns plain sample vectors where `NaN` marks a
//! missing value. Only `trim_edges`, `delta_filter` and `resample_mean`
//! change the length.

use crate::rolling::rolling_median_centered;

/// Drop `count` samples from both ends; empty when nothing would remain
pub fn trim_edges(samples: &[f64], count: usize) -> Vec<f64> {
    if samples.len() <= count.saturating_mul(2) {
        return Vec::new();
    }
    samples[count..samples.len() - count].to_vec()
}

/// Pull values into `[min, max]`; missing values stay missing
pub fn clamp_range(samples: &mut [f64], min: f64, max: f64) {
    for v in samples.iter_mut().filter(|v| !v.is_nan()) {
        *v = v.clamp(min, max);
    }
}

/// Drop physiologically implausible instantaneous falls.
///
/// A sample is accepted when its drop relative to the previous accepted
/// sample is below `threshold_pct` percent; rejected samples are removed, so
/// the output may be shorter than the input. The first sample is always
/// accepted. Missing samples pass through and never become the reference.
pub fn delta_filter(samples: &[f64], threshold_pct: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut reference: Option<f64> = None;

    for &cur in samples {
        if cur.is_nan() {
            out.push(cur);
            continue;
        }
        let accept = match reference {
            None => true,
            Some(prev) if prev == 0.0 => true,
            Some(prev) => (prev - cur) / prev * 100.0 < threshold_pct,
        };
        if accept {
            out.push(cur);
            reference = Some(cur);
        }
    }

    out
}

/// Centered median smoothing that ignores missing values
pub fn median_smooth(samples: &[f64], window: usize) -> Vec<f64> {
    rolling_median_centered(samples, window)
}

/// Blank out runs of consecutive values at or below `threshold` that are
/// longer than `run_length` samples.
pub fn remove_blocks(samples: &mut [f64], threshold: f64, run_length: usize) {
    let mut i = 0;
    while i < samples.len() {
        if samples[i].is_nan() || samples[i] > threshold {
            i += 1;
            continue;
        }
        let start = i;
        while i < samples.len() && !samples[i].is_nan() && samples[i] <= threshold {
            i += 1;
        }
        if i - start > run_length {
            samples[start..i].fill(f64::NAN);
        }
    }
}

/// Average consecutive chunks of `chunk` samples. A chunk with no finite
/// values becomes missing; a short final chunk is averaged over what it has.
pub fn resample_mean(samples: &[f64], chunk: usize) -> Vec<f64> {
    if chunk <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(chunk)
        .map(|c| {
            let (sum, count) = c
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Linearly interpolate interior gaps. Leading and trailing gaps take the
/// nearest finite value. Returns the number of samples filled.
pub fn interpolate_gaps(samples: &mut [f64]) -> usize {
    let Some(first) = samples.iter().position(|v| !v.is_nan()) else {
        return 0;
    };
    let mut filled = 0;

    for i in 0..first {
        samples[i] = samples[first];
        filled += 1;
    }

    let mut last = first;
    for i in first + 1..samples.len() {
        if samples[i].is_nan() {
            continue;
        }
        let gap = i - last;
        if gap > 1 {
            let start = samples[last];
            let step = (samples[i] - start) / gap as f64;
            for k in 1..gap {
                samples[last + k] = start + step * k as f64;
                filled += 1;
            }
        }
        last = i;
    }

    let tail = samples[last];
    for v in samples.iter_mut().skip(last + 1) {
        *v = tail;
        filled += 1;
    }

    filled
}

pub fn count_missing(samples: &[f64]) -> usize {
    samples.iter().filter(|v| v.is_nan()).count()
}

//! Summary statistics that skip missing samples

fn finite(samples: &[f64]) -> impl Iterator<Item = f64> + '_ {
    samples.iter().copied().filter(|v| v.is_finite())
}

fn sorted_finite(samples: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = finite(samples).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

pub fn mean(samples: &[f64]) -> Option<f64> {
    let (sum, count) = finite(samples).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Population standard deviation
pub fn std_dev(samples: &[f64]) -> Option<f64> {
    let mu = mean(samples)?;
    let (sq, count) = finite(samples).fold((0.0, 0usize), |(s, n), v| (s + (v - mu).powi(2), n + 1));
    Some((sq / count as f64).sqrt())
}

pub fn median(samples: &[f64]) -> Option<f64> {
    percentile(samples, 50.0)
}

pub fn min(samples: &[f64]) -> Option<f64> {
    finite(samples).reduce(f64::min)
}

pub fn max(samples: &[f64]) -> Option<f64> {
    finite(samples).reduce(f64::max)
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(samples: &[f64], pct: f64) -> Option<f64> {
    let sorted = sorted_finite(samples);
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Share of samples strictly below `level`, in percent
pub fn percent_below(samples: &[f64], level: f64) -> Option<f64> {
    let (below, count) = finite(samples).fold((0usize, 0usize), |(b, n), v| (b + usize::from(v < level), n + 1));
    (count > 0).then(|| below as f64 / count as f64 * 100.0)
}

/// Number of times the series crosses its own mean
pub fn mean_crossings(samples: &[f64]) -> Option<usize> {
    let mu = mean(samples)?;
    let signs: Vec<bool> = finite(samples).filter(|v| *v != mu).map(|v| v > mu).collect();
    Some(signs.windows(2).filter(|w| w[0] != w[1]).count())
}

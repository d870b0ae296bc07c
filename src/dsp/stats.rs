//! Robust summary statistics

/// Copy and sort ascending, dropping NaN
fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between closest ranks (`q` in 0-100)
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted(values);
    percentile_sorted(&sorted, q)
}

/// Same as [`percentile`] for data already sorted ascending
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !q.is_finite() {
        return None;
    }
    let q = q.clamp(0.0, 100.0);
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Tukey fence bounds `[q1 - 1.5 iqr, q3 + 1.5 iqr]`; needs more than 5 values
pub fn iqr_bounds(values: &[f64]) -> Option<(f64, f64)> {
    let sorted = sorted(values);
    if sorted.len() <= 5 {
        return None;
    }
    let q1 = percentile_sorted(&sorted, 25.0)?;
    let q3 = percentile_sorted(&sorted, 75.0)?;
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Values inside the Tukey fences; five or fewer values pass through untouched
pub fn iqr_trim(values: &[f64]) -> Vec<f64> {
    match iqr_bounds(values) {
        Some((lo, hi)) => values.iter().copied().filter(|v| (lo..=hi).contains(v)).collect(),
        None => values.to_vec(),
    }
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (n - 1 denominator); needs two values
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Sliding median with an odd kernel and zero-padded edges
pub fn median_filter(signal: &[f64], kernel: usize) -> Vec<f64> {
    let kernel = if kernel % 2 == 0 { kernel + 1 } else { kernel };
    if kernel <= 1 || signal.is_empty() {
        return signal.to_vec();
    }
    let half = kernel / 2;
    let n = signal.len();
    let mut window = Vec::with_capacity(kernel);

    (0..n)
        .map(|i| {
            window.clear();
            for offset in 0..kernel {
                let idx = i as isize + offset as isize - half as isize;
                let value = if idx < 0 || idx >= n as isize {
                    0.0
                } else {
                    signal[idx as usize]
                };
                window.push(value);
            }
            window.sort_by(|a, b| a.total_cmp(b));
            window[half]
        })
        .collect()
}

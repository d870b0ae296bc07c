//! Oxygen saturation statistics

use crate::config::Spo2Config;
use crate::dsp::stats::percentile_sorted;
use crate::types::{ArtifactMask, MetricStatus, Spo2AnalysisResult};

/// Robust saturation statistics over plausible, unmasked samples
pub fn analyze(
    name: &str,
    samples: &[f64],
    fs: f64,
    mask: &ArtifactMask,
    config: &Spo2Config,
) -> Spo2AnalysisResult {
    let mut values: Vec<f64> = samples
        .iter()
        .enumerate()
        .filter(|(i, v)| {
            v.is_finite() && (config.min_valid..=config.max_valid).contains(*v) && mask.is_valid(*i)
        })
        .map(|(_, v)| *v)
        .collect();

    let mut result = Spo2AnalysisResult::empty(MetricStatus::InsufficientData);
    result.channel = Some(name.to_string());
    if values.is_empty() || fs <= 0.0 {
        return result;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let minutes_below = |threshold: f64| {
        let count = values.partition_point(|v| *v < threshold);
        count as f64 / fs / 60.0
    };

    result.status = MetricStatus::Computed;
    result.avg_spo2 = percentile_sorted(&values, 50.0);
    result.min_spo2 = percentile_sorted(&values, 1.0);
    result.spo2_baseline = percentile_sorted(&values, 90.0);
    result.time_below_90 = Some(minutes_below(config.threshold_90));
    result.time_below_85 = Some(minutes_below(config.threshold_85));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_exclude_implausible_values() {
        // one sample per second: 10 min at 96%, 2 min at 88%, 1 min at 84%, dropouts at 0
        let mut samples = vec![96.0; 600];
        samples.extend(vec![88.0; 120]);
        samples.extend(vec![84.0; 60]);
        samples.extend(vec![0.0; 30]);
        let mask = ArtifactMask::all_valid(samples.len(), 1.0);

        let result = analyze("SpO2", &samples, 1.0, &mask, &Spo2Config::default());
        assert_eq!(result.status, MetricStatus::Computed);
        assert_eq!(result.avg_spo2, Some(96.0));
        assert_eq!(result.min_spo2, Some(84.0));
        assert_eq!(result.spo2_baseline, Some(96.0));
        assert!((result.time_below_90.unwrap() - 3.0).abs() < 1e-9);
        assert!((result.time_below_85.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_masked_samples_excluded() {
        let samples = vec![80.0, 80.0, 97.0, 97.0];
        let mut mask = ArtifactMask::all_valid(4, 1.0);
        mask.valid[0] = false;
        mask.valid[1] = false;
        let result = analyze("SpO2", &samples, 1.0, &mask, &Spo2Config::default());
        assert_eq!(result.time_below_90, Some(0.0));
        assert_eq!(result.min_spo2, Some(97.0));
    }

    #[test]
    fn test_nothing_plausible_is_insufficient() {
        let samples = vec![0.0, 120.0, f64::NAN];
        let mask = ArtifactMask::all_valid(3, 1.0);
        let result = analyze("SpO2", &samples, 1.0, &mask, &Spo2Config::default());
        assert_eq!(result.status, MetricStatus::InsufficientData);
        assert_eq!(result.avg_spo2, None);
        assert_eq!(result.time_below_90, None);
    }
}

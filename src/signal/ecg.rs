//! R-peak detection and heart rate metrics

use crate::config::EcgConfig;
use crate::dsp::peaks::select_by_distance;
use crate::dsp::{
    find_peaks, median, median_filter, percentile, sample_std_dev, PeakOptions, SosFilter,
};
use crate::types::{ArtifactMask, EcgAnalysisResult, MetricStatus};
use tracing::{debug, warn};

/// Heart rate figures derived from valid RR intervals
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateMetrics {
    pub avg_heart_rate: f64,
    pub min_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub heart_rate_variability: Option<f64>,
}

/// Band-pass the centred signal, falling back to the unfiltered one
fn bandpass(centered: &[f64], fs: f64, config: &EcgConfig) -> Vec<f64> {
    let Some(filter) =
        SosFilter::butter_bandpass(config.filter_order, config.bandpass_low, config.bandpass_high, fs)
    else {
        warn!(
            low = config.bandpass_low,
            high = config.bandpass_high,
            fs,
            "ECG band-pass does not fit below Nyquist, skipping filter"
        );
        return centered.to_vec();
    };

    match filter.filtfilt(centered) {
        Some(filtered) => filtered,
        None => {
            warn!(
                samples = centered.len(),
                "ECG signal too short for zero-phase filtering, skipping filter"
            );
            centered.to_vec()
        }
    }
}

/// Move each smoothed maximum onto the squared QRS apex within half the
/// peak distance, then enforce the distance again on the moved peaks
fn refine_to_apex(squared: &[f64], candidates: &[usize], distance: usize) -> Vec<usize> {
    let half = distance / 2;
    let mut refined: Vec<usize> = candidates
        .iter()
        .map(|&p| {
            let lo = p.saturating_sub(half);
            let hi = (p + half + 1).min(squared.len());
            (lo..hi)
                .max_by(|&a, &b| squared[a].total_cmp(&squared[b]))
                .unwrap_or(p)
        })
        .collect();
    refined.sort_unstable();
    refined.dedup();
    select_by_distance(squared, &refined, distance)
}

/// R-peak sample indices, ascending
pub fn detect_r_peaks(samples: &[f64], fs: f64, config: &EcgConfig) -> Vec<usize> {
    let Some(center) = median(samples) else {
        return Vec::new();
    };
    let centered: Vec<f64> = samples.iter().map(|v| v - center).collect();
    let filtered = bandpass(&centered, fs, config);

    let squared: Vec<f64> = filtered.iter().map(|v| v * v).collect();
    let window = ((config.smoothing_window_s * fs).round() as usize).max(1);
    let smoothed = median_filter(&squared, window);

    let Some(threshold) = percentile(&smoothed, config.threshold_percentile) else {
        return Vec::new();
    };
    let distance = ((config.peak_min_distance_s * fs).round() as usize).max(1);
    let options = PeakOptions {
        height: Some(threshold),
        distance: Some(distance),
        ..Default::default()
    };
    let candidates = find_peaks(&smoothed, &options);

    let peaks = refine_to_apex(&squared, &candidates, distance);
    debug!(
        candidates = candidates.len(),
        peaks = peaks.len(),
        threshold,
        "R-peaks detected"
    );
    peaks
}

/// RR intervals (s) within the plausible range whose span is fully valid
pub fn valid_rr_intervals(
    peaks: &[usize],
    fs: f64,
    mask: &ArtifactMask,
    config: &EcgConfig,
) -> Vec<f64> {
    let Some(&last) = peaks.last() else {
        return Vec::new();
    };

    // invalid[i] = invalid samples in [0, i)
    let mut invalid = Vec::with_capacity(last + 2);
    invalid.push(0usize);
    for i in 0..=last {
        let prev = invalid[i];
        invalid.push(prev + usize::from(!mask.is_valid(i)));
    }

    peaks
        .windows(2)
        .filter(|w| invalid[w[1] + 1] == invalid[w[0]])
        .map(|w| (w[1] - w[0]) as f64 / fs)
        .filter(|rr| (config.rr_min..=config.rr_max).contains(rr))
        .collect()
}

/// Average (from the median RR), percentile band and SDNN
pub fn heart_rate_metrics(rr: &[f64], config: &EcgConfig) -> Option<HeartRateMetrics> {
    let median_rr = median(rr)?;
    let heart_rates: Vec<f64> = rr
        .iter()
        .map(|r| 60.0 / r)
        .filter(|hr| (config.hr_min..=config.hr_max).contains(hr))
        .collect();

    Some(HeartRateMetrics {
        avg_heart_rate: 60.0 / median_rr,
        min_heart_rate: percentile(&heart_rates, 5.0),
        max_heart_rate: percentile(&heart_rates, 95.0),
        heart_rate_variability: sample_std_dev(rr).map(|sd| sd * 1000.0),
    })
}

/// Analyze one cardiac channel; annotation counts are left at zero
pub fn analyze(
    name: &str,
    samples: &[f64],
    fs: f64,
    mask: &ArtifactMask,
    config: &EcgConfig,
) -> EcgAnalysisResult {
    let peaks = detect_r_peaks(samples, fs, config);
    let rr = valid_rr_intervals(&peaks, fs, mask, config);

    let mut result = EcgAnalysisResult::empty(MetricStatus::InsufficientData);
    result.channel = Some(name.to_string());
    result.r_peaks = peaks;
    result.valid_rr_intervals = rr.len();

    if rr.len() < config.min_rr_intervals.max(1) {
        debug!(channel = name, valid = rr.len(), "not enough valid RR intervals");
        return result;
    }

    if let Some(metrics) = heart_rate_metrics(&rr, config) {
        result.status = MetricStatus::Computed;
        result.avg_heart_rate = Some(metrics.avg_heart_rate);
        result.min_heart_rate = metrics.min_heart_rate;
        result.max_heart_rate = metrics.max_heart_rate;
        result.heart_rate_variability = metrics.heart_rate_variability;
    }
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Gaussian QRS complexes at the given beat times on a small baseline wave
    pub(crate) fn synthetic_ecg(fs: f64, secs: f64, beats: &[f64]) -> Vec<f64> {
        let sigma = 0.025;
        (0..(fs * secs) as usize)
            .map(|i| {
                let t = i as f64 / fs;
                let qrs: f64 = beats
                    .iter()
                    .map(|b| (-((t - b) / sigma).powi(2) / 2.0).exp())
                    .sum();
                qrs + 0.05 * (2.0 * std::f64::consts::PI * 0.3 * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_detects_regular_beats() {
        let fs = 256.0;
        let beats: Vec<f64> = (1..30).map(f64::from).collect();
        let signal = synthetic_ecg(fs, 30.0, &beats);
        let config = EcgConfig::default();

        let peaks = detect_r_peaks(&signal, fs, &config);
        assert_eq!(peaks.len(), beats.len());
        for (peak, beat) in peaks.iter().zip(&beats) {
            let expected = (beat * fs).round() as i64;
            assert!((*peak as i64 - expected).abs() <= 1, "{peak} vs {expected}");
        }

        let mask = ArtifactMask::all_valid(signal.len(), fs);
        let result = analyze("ECG II", &signal, fs, &mask, &config);
        assert_eq!(result.status, MetricStatus::Computed);
        assert!((result.avg_heart_rate.unwrap() - 60.0).abs() < 1.0);
        assert!(result.heart_rate_variability.unwrap() < 10.0);
    }

    #[test]
    fn test_rr_spanning_artifact_is_dropped() {
        let fs = 10.0;
        let config = EcgConfig::default();
        let peaks = [0, 10, 20, 30, 40];
        let mut mask = ArtifactMask::all_valid(50, fs);
        mask.valid[25] = false;

        let rr = valid_rr_intervals(&peaks, fs, &mask, &config);
        assert_eq!(rr, vec![1.0, 1.0, 1.0]);

        // invalid sample on a peak drops both neighbouring intervals
        mask.valid[25] = true;
        mask.valid[10] = false;
        assert_eq!(valid_rr_intervals(&peaks, fs, &mask, &config), vec![1.0, 1.0]);
    }

    #[test]
    fn test_implausible_rr_rejected() {
        let fs = 10.0;
        let config = EcgConfig::default();
        let mask = ArtifactMask::all_valid(100, fs);
        // 0.2 s and 2.5 s intervals fall outside 0.3-2.0 s
        let rr = valid_rr_intervals(&[0, 2, 12, 37, 45], fs, &mask, &config);
        assert_eq!(rr, vec![1.0, 0.8]);
    }

    #[test]
    fn test_heart_rate_metrics() {
        let config = EcgConfig::default();
        let metrics = heart_rate_metrics(&[1.0, 0.8, 1.2], &config).unwrap();
        assert!((metrics.avg_heart_rate - 60.0).abs() < 1e-9);
        assert!((metrics.heart_rate_variability.unwrap() - 200.0).abs() < 1e-9);
        assert!(metrics.min_heart_rate.unwrap() < metrics.max_heart_rate.unwrap());

        let single = heart_rate_metrics(&[0.75], &config).unwrap();
        assert!((single.avg_heart_rate - 80.0).abs() < 1e-9);
        assert_eq!(single.heart_rate_variability, None);
        assert!(heart_rate_metrics(&[], &config).is_none());
    }

    #[test]
    fn test_refined_peaks_keep_minimum_distance() {
        let mut squared = vec![0.0; 30];
        squared[14] = 5.0;
        squared[17] = 4.0;
        squared[24] = 1.0;
        // Both candidates move toward the shared complex, 3 samples apart
        assert_eq!(refine_to_apex(&squared, &[10, 20], 10), vec![14]);

        squared[17] = 0.0;
        assert_eq!(refine_to_apex(&squared, &[10, 20], 10), vec![14, 24]);
    }

    #[test]
    fn test_detected_peaks_respect_refractory_distance() {
        let fs = 256.0;
        let config = EcgConfig::default();
        // Paired complexes 0.31 s apart, just past the refractory time
        let mut beats = Vec::new();
        for i in 1..20 {
            let t = f64::from(i) * 1.2;
            beats.extend([t, t + 0.31]);
        }
        let signal = synthetic_ecg(fs, 25.0, &beats);
        let distance = (config.peak_min_distance_s * fs).round() as usize;

        let peaks = detect_r_peaks(&signal, fs, &config);
        assert!(!peaks.is_empty());
        assert!(peaks.windows(2).all(|w| w[1] - w[0] >= distance), "{peaks:?}");
    }

    #[test]
    fn test_flat_signal_is_insufficient() {
        let fs = 256.0;
        let signal = vec![0.0; 2560];
        let mask = ArtifactMask::all_valid(signal.len(), fs);
        let result = analyze("ECG", &signal, fs, &mask, &EcgConfig::default());
        assert!(result.insufficient_data());
        assert_eq!(result.avg_heart_rate, None);
    }
}

//! Breathing-cycle detection and respiratory rate

use crate::config::RespirationConfig;
use crate::dsp::{find_peaks, iqr_bounds, mean, median, std_dev, PeakOptions, SosFilter};
use crate::types::ArtifactMask;
use tracing::{debug, warn};

const FLAT_SIGNAL_SD: f64 = 1e-8;
const ZSCORE_EPSILON: f64 = 1e-8;

/// Peaks and plausible rates found in one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBreathing {
    /// Peak indices into the full channel
    pub peaks: Vec<usize>,
    /// Inter-peak intervals (s) whose rate lies within the plausible band
    pub intervals: Vec<f64>,
}

impl ChannelBreathing {
    /// Breaths per minute for each retained interval
    pub fn rates(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| 60.0 / i).collect()
    }

    /// 60 / median retained interval
    pub fn rate(&self) -> Option<f64> {
        median(&self.intervals).map(|i| 60.0 / i)
    }
}

/// Band-pass, z-score and peak-pick one artifact-free segment
fn segment_peaks(segment: &[f64], fs: f64, config: &RespirationConfig) -> Vec<usize> {
    let Some(center) = median(segment) else {
        return Vec::new();
    };
    let centered: Vec<f64> = segment.iter().map(|v| v - center).collect();
    if std_dev(&centered).map_or(true, |sd| sd < FLAT_SIGNAL_SD) {
        debug!(samples = segment.len(), "flat respiratory segment skipped");
        return Vec::new();
    }

    let filtered = if config.apply_filter {
        match SosFilter::butter_bandpass(config.filter_order, config.filter_low, config.filter_high, fs)
            .and_then(|f| f.filtfilt(&centered))
        {
            Some(filtered) => filtered,
            None => {
                warn!(
                    samples = centered.len(),
                    fs, "respiratory band-pass not applicable, using unfiltered segment"
                );
                centered
            }
        }
    } else {
        centered
    };

    let (Some(mu), Some(sd)) = (mean(&filtered), std_dev(&filtered)) else {
        return Vec::new();
    };
    let normalized: Vec<f64> = filtered
        .iter()
        .map(|v| (v - mu) / (sd + ZSCORE_EPSILON))
        .collect();

    let distance = ((config.peak_distance_s * fs).round() as usize).max(1);
    let strict = PeakOptions {
        height: Some(config.height),
        distance: Some(distance),
        prominence: Some(config.prominence),
        width: Some(config.width_s * fs),
        wlen: Some((config.wlen_s * fs).round() as usize),
    };
    let peaks = find_peaks(&normalized, &strict);
    if peaks.len() >= 3 {
        return peaks;
    }

    let relaxed = PeakOptions {
        height: Some(config.fallback_height),
        distance: Some(distance),
        prominence: Some(config.fallback_prominence),
        ..Default::default()
    };
    let fallback = find_peaks(&normalized, &relaxed);
    debug!(
        strict = peaks.len(),
        relaxed = fallback.len(),
        "relaxed respiratory peak pass"
    );
    fallback
}

/// Analyze one channel across its valid segments
pub fn analyze_channel(
    samples: &[f64],
    fs: f64,
    mask: &ArtifactMask,
    config: &RespirationConfig,
) -> ChannelBreathing {
    let min_len = (config.min_segment_s * fs).ceil() as usize;
    let mut breathing = ChannelBreathing::default();

    for (start, end) in mask.valid_segments(min_len) {
        let end = end.min(samples.len());
        if end <= start {
            continue;
        }
        let peaks = segment_peaks(&samples[start..end], fs, config);

        breathing.intervals.extend(
            peaks
                .windows(2)
                .map(|w| (w[1] - w[0]) as f64 / fs)
                .filter(|i| (config.min_rate..=config.max_rate).contains(&(60.0 / i))),
        );
        breathing.peaks.extend(peaks.iter().map(|p| p + start));
    }

    if config.iqr_trim {
        if let Some((lo, hi)) = iqr_bounds(&breathing.rates()) {
            let before = breathing.intervals.len();
            breathing.intervals.retain(|i| (lo..=hi).contains(&(60.0 / i)));
            debug!(
                dropped = before - breathing.intervals.len(),
                "respiratory rate outliers trimmed"
            );
        }
    }

    breathing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn breathing_wave(rate_bpm: f64, fs: f64, secs: f64) -> Vec<f64> {
        let freq = rate_bpm / 60.0;
        (0..(fs * secs) as usize)
            .map(|i| 0.8 * (2.0 * PI * freq * i as f64 / fs).sin() + 2.0)
            .collect()
    }

    #[test]
    fn test_fifteen_breaths_per_minute() {
        let fs = 25.0;
        let signal = breathing_wave(15.0, fs, 120.0);
        let mask = ArtifactMask::all_valid(signal.len(), fs);
        let breathing = analyze_channel(&signal, fs, &mask, &RespirationConfig::default());

        assert!(breathing.peaks.len() >= 28);
        let rate = breathing.rate().unwrap();
        assert!((rate - 15.0).abs() < 0.5, "rate {rate}");
    }

    #[test]
    fn test_flat_channel_yields_nothing() {
        let fs = 25.0;
        let signal = vec![1.0; 2000];
        let mask = ArtifactMask::all_valid(signal.len(), fs);
        let breathing = analyze_channel(&signal, fs, &mask, &RespirationConfig::default());
        assert!(breathing.peaks.is_empty());
        assert_eq!(breathing.rate(), None);
    }

    #[test]
    fn test_short_segments_skipped() {
        let fs = 25.0;
        let signal = breathing_wave(15.0, fs, 60.0);
        let mut mask = ArtifactMask::all_valid(signal.len(), fs);
        // valid runs of 15 s and 25 s around an artifact
        for v in &mut mask.valid[375..875] {
            *v = false;
        }
        let breathing = analyze_channel(&signal, fs, &mask, &RespirationConfig::default());
        assert!(breathing.peaks.iter().all(|&p| p >= 875));
        assert!(!breathing.peaks.is_empty());
    }

    #[test]
    fn test_iqr_trim_drops_rate_outliers() {
        let fs = 25.0;
        // 15 breaths/min with one long pause giving a 9 breaths/min interval
        let mut signal = breathing_wave(15.0, fs, 60.0);
        signal.extend(vec![2.0; (2.6 * fs) as usize]);
        signal.extend(breathing_wave(15.0, fs, 60.0));
        let mask = ArtifactMask::all_valid(signal.len(), fs);

        let plain = analyze_channel(&signal, fs, &mask, &RespirationConfig::default());
        let config = RespirationConfig {
            iqr_trim: true,
            ..Default::default()
        };
        let trimmed = analyze_channel(&signal, fs, &mask, &config);

        assert!(trimmed.intervals.len() < plain.intervals.len());
        assert_eq!(trimmed.peaks, plain.peaks);
        assert!(trimmed.rates().iter().all(|r| (r - 15.0).abs() < 1.5), "{:?}", trimmed.rates());
    }

    #[test]
    fn test_out_of_band_rate_discarded() {
        let fs = 25.0;
        // 40 breaths/min exceeds the plausible band
        let signal = breathing_wave(40.0, fs, 60.0);
        let mask = ArtifactMask::all_valid(signal.len(), fs);
        let breathing = analyze_channel(&signal, fs, &mask, &RespirationConfig::default());
        assert!(breathing.intervals.is_empty());
        assert_eq!(breathing.rate(), None);
    }
}

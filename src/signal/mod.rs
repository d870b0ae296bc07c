//! Single-channel physiological signal analysis
//!
//! [`SignalAnalyzer`] picks the channels carrying each role by keyword, maps
//! the recording-level artifact mask onto them and delegates to the cardiac,
//! respiratory and oximetry analyzers. A missing channel yields a
//! `MissingSignal` status on that metric only.

pub mod ecg;
pub mod respiration;
pub mod spo2;

use crate::config::AnalysisConfig;
use crate::dsp::{iqr_trim, mean, percentile};
use crate::labels::EventCategory;
use crate::types::{
    AnnotationEvent, ArtifactMask, Channel, ChannelPeaks, ChannelRole, EcgAnalysisResult,
    MetricStatus, RespirationAnalysisResult, Spo2AnalysisResult,
};
use tracing::debug;

/// Runs the per-signal analyzers against one recording
#[derive(Debug, Clone, Copy)]
pub struct SignalAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> SignalAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Channels whose name matches the role keywords, in recording order
    pub fn select_channels<'c>(&self, role: ChannelRole, channels: &'c [Channel]) -> Vec<&'c Channel> {
        self.config.channels.select(role, channels)
    }

    /// Heart rate metrics from the first cardiac channel plus annotated
    /// arrhythmia counts
    pub fn analyze_ecg(
        &self,
        channels: &[Channel],
        sampling_rate: f64,
        mask: &ArtifactMask,
        annotations: &[AnnotationEvent],
    ) -> EcgAnalysisResult {
        let mut result = match self.select_channels(ChannelRole::Cardiac, channels).first() {
            Some(channel) => {
                let fs = channel.rate_or(sampling_rate);
                let mask = mask.resample(channel.samples.len(), fs);
                ecg::analyze(&channel.name, &channel.samples, fs, &mask, &self.config.ecg)
            }
            None => {
                debug!("no cardiac channel");
                EcgAnalysisResult::empty(MetricStatus::MissingSignal)
            }
        };

        let events = &self.config.labels.events;
        result.tachycardia_events = events.count(annotations, EventCategory::Tachycardia);
        result.bradycardia_events = events.count(annotations, EventCategory::Bradycardia);
        result
    }

    /// Respiratory rate aggregated over every respiratory channel.
    ///
    /// When `annotations` is given, annotated apnea and hypopnea counts are
    /// reported alongside the signal-derived rate.
    pub fn analyze_respiration(
        &self,
        channels: &[Channel],
        sampling_rate: f64,
        mask: &ArtifactMask,
        annotations: Option<&[AnnotationEvent]>,
    ) -> RespirationAnalysisResult {
        let config = &self.config.respiration;
        let mut candidates = self.select_channels(ChannelRole::Respiratory, channels);
        if let Some(cap) = config.max_channels {
            candidates.truncate(cap);
        }

        let mut result = if candidates.is_empty() {
            debug!("no respiratory channel");
            RespirationAnalysisResult::empty(MetricStatus::MissingSignal)
        } else {
            let mut result = RespirationAnalysisResult::empty(MetricStatus::InsufficientData);
            let mut channel_rates = Vec::new();
            let mut pooled = Vec::new();

            for channel in candidates {
                let fs = channel.rate_or(sampling_rate);
                let mask = mask.resample(channel.samples.len(), fs);
                let breathing = respiration::analyze_channel(&channel.samples, fs, &mask, config);
                let rate = breathing.rate();
                debug!(channel = %channel.name, peaks = breathing.peaks.len(), ?rate, "respiratory channel analyzed");

                channel_rates.extend(rate);
                pooled.extend(breathing.rates());
                result.channels.push(channel.name.clone());
                result.breath_peaks.push(ChannelPeaks {
                    channel: channel.name.clone(),
                    peaks: breathing.peaks,
                    rate,
                });
            }

            if config.iqr_trim {
                pooled = iqr_trim(&pooled);
            }
            if let Some(avg) = mean(&channel_rates) {
                result.status = MetricStatus::Computed;
                result.avg_resp_rate = Some(avg);
                result.min_resp_rate = percentile(&pooled, 10.0);
                result.max_resp_rate = percentile(&pooled, 90.0);
            }
            result
        };

        if let Some(annotations) = annotations {
            let events = &self.config.labels.events;
            let count = |categories: &[EventCategory]| -> u32 {
                categories.iter().map(|c| events.count(annotations, *c)).sum()
            };
            result.annotated_apneas = Some(count(&[
                EventCategory::ObstructiveApnea,
                EventCategory::CentralApnea,
                EventCategory::MixedApnea,
            ]));
            result.annotated_hypopneas = Some(count(&[
                EventCategory::ObstructiveHypopnea,
                EventCategory::CentralHypopnea,
                EventCategory::MixedHypopnea,
            ]));
        }
        result
    }

    /// Saturation statistics from the first oxygen channel
    pub fn analyze_spo2(
        &self,
        channels: &[Channel],
        sampling_rate: f64,
        mask: &ArtifactMask,
    ) -> Spo2AnalysisResult {
        match self.select_channels(ChannelRole::Oxygen, channels).first() {
            Some(channel) => {
                let fs = channel.rate_or(sampling_rate);
                let mask = mask.resample(channel.samples.len(), fs);
                spo2::analyze(&channel.name, &channel.samples, fs, &mask, &self.config.spo2)
            }
            None => {
                debug!("no oxygen saturation channel");
                Spo2AnalysisResult::empty(MetricStatus::MissingSignal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    fn breathing(name: &str, rate_bpm: f64, fs: f64, secs: f64) -> Channel {
        let freq = rate_bpm / 60.0;
        Channel::new(
            name,
            (0..(fs * secs) as usize)
                .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
                .collect(),
        )
    }

    #[test]
    fn test_respiratory_channel_selection() {
        let config = AnalysisConfig::default();
        let analyzer = SignalAnalyzer::new(&config);
        let channels = vec![
            Channel::new("EEG C3-A2", vec![0.0; 10]),
            Channel::new("Thorax RIP", vec![0.0; 10]),
        ];
        let selected = analyzer.select_channels(ChannelRole::Respiratory, &channels);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "Thorax RIP");
    }

    #[test]
    fn test_missing_channels_do_not_block_others() {
        let config = AnalysisConfig::default();
        let analyzer = SignalAnalyzer::new(&config);
        let channels = vec![Channel::new("SpO2", vec![95.0; 60])];
        let mask = ArtifactMask::all_valid(60, 1.0);
        let annotations = vec![AnnotationEvent::new(5.0, 0.0, "Тахикардия")];

        let ecg = analyzer.analyze_ecg(&channels, 1.0, &mask, &annotations);
        assert_eq!(ecg.status, MetricStatus::MissingSignal);
        assert_eq!(ecg.tachycardia_events, 1);

        let resp = analyzer.analyze_respiration(&channels, 1.0, &mask, None);
        assert_eq!(resp.status, MetricStatus::MissingSignal);
        assert_eq!(resp.annotated_apneas, None);

        let spo2 = analyzer.analyze_spo2(&channels, 1.0, &mask);
        assert_eq!(spo2.status, MetricStatus::Computed);
        assert_eq!(spo2.avg_spo2, Some(95.0));
    }

    #[test]
    fn test_respiration_averages_channels() {
        let config = AnalysisConfig::default();
        let analyzer = SignalAnalyzer::new(&config);
        let fs = 25.0;
        let channels = vec![
            breathing("Thorax RIP", 12.0, fs, 120.0),
            breathing("Abdomen RIP", 18.0, fs, 120.0),
        ];
        let mask = ArtifactMask::all_valid(3000, fs);
        let annotations = vec![
            AnnotationEvent::new(30.0, 12.0, "Obstructive Apnea"),
            AnnotationEvent::new(60.0, 15.0, "Hypopnea"),
        ];

        let result = analyzer.analyze_respiration(&channels, fs, &mask, Some(&annotations));
        assert_eq!(result.status, MetricStatus::Computed);
        assert_eq!(result.channels, vec!["Thorax RIP", "Abdomen RIP"]);
        assert!((result.avg_resp_rate.unwrap() - 15.0).abs() < 0.5);
        assert!(result.min_resp_rate.unwrap() < result.max_resp_rate.unwrap());
        assert_eq!(result.annotated_apneas, Some(1));
        assert_eq!(result.annotated_hypopneas, Some(1));
    }

    #[test]
    fn test_channel_rate_overrides_recording_rate() {
        let config = AnalysisConfig::default();
        let analyzer = SignalAnalyzer::new(&config);
        let mut channel = breathing("Flow", 15.0, 10.0, 120.0);
        channel.sampling_rate = Some(10.0);
        let mask = ArtifactMask::all_valid(120 * 100, 100.0);

        let result = analyzer.analyze_respiration(&[channel], 100.0, &mask, None);
        assert!((result.avg_resp_rate.unwrap() - 15.0).abs() < 0.5);
    }
}

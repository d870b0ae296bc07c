//! Core types for the Synheart PSG engine
//!
//! This module defines the data structures that flow through each stage of the
//! analysis: the decoded recording, the artifact mask, per-signal results,
//! sleep architecture, respiratory indices and the composite quality score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single decoded signal channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel label from the recording header (e.g. "ECG II", "Thorax RIP")
    pub name: String,
    /// Samples in physical units
    pub samples: Vec<f64>,
    /// Channel-specific sampling rate (Hz); falls back to the recording rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            samples,
            sampling_rate: None,
        }
    }

    /// Effective sampling rate given the recording-level rate
    pub fn rate_or(&self, recording_rate: f64) -> f64 {
        self.sampling_rate.unwrap_or(recording_rate)
    }
}

/// Role a channel plays in the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Cardiac,
    Respiratory,
    Oxygen,
}

/// Time-stamped annotation (seconds from recording start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEvent {
    pub onset: f64,
    #[serde(default)]
    pub duration: f64,
    pub label: String,
}

impl AnnotationEvent {
    pub fn new(onset: f64, duration: f64, label: impl Into<String>) -> Self {
        Self {
            onset,
            duration,
            label: label.into(),
        }
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

/// Fully decoded recording handed to the engine by a recording source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Identifier used only for tagging results
    pub id: String,
    /// Recording-level sampling rate (Hz)
    pub sampling_rate: f64,
    pub channels: Vec<Channel>,
    pub annotations: Vec<AnnotationEvent>,
}

impl Recording {
    /// Number of samples at the recording rate (longest channel)
    pub fn sample_count(&self) -> usize {
        self.channels
            .iter()
            .map(|c| {
                let rate = c.rate_or(self.sampling_rate);
                if (rate - self.sampling_rate).abs() < f64::EPSILON || rate <= 0.0 {
                    c.samples.len()
                } else {
                    (c.samples.len() as f64 * self.sampling_rate / rate).round() as usize
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Recording duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            self.sample_count() as f64 / self.sampling_rate
        } else {
            0.0
        }
    }
}

/// Per-sample validity mask, `true` = valid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMask {
    pub sampling_rate: f64,
    pub valid: Vec<bool>,
}

impl ArtifactMask {
    /// Mask with every sample valid
    pub fn all_valid(len: usize, sampling_rate: f64) -> Self {
        Self {
            sampling_rate,
            valid: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Samples past the end of the mask count as valid
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(true)
    }

    pub fn is_valid_at(&self, time: f64) -> bool {
        if time < 0.0 || self.sampling_rate <= 0.0 {
            return true;
        }
        self.is_valid((time * self.sampling_rate).floor() as usize)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Map the mask onto a channel with a different length or sampling rate
    pub fn resample(&self, len: usize, sampling_rate: f64) -> ArtifactMask {
        if len == self.valid.len() && (sampling_rate - self.sampling_rate).abs() < f64::EPSILON {
            return self.clone();
        }
        let valid = (0..len)
            .map(|i| self.is_valid_at(i as f64 / sampling_rate))
            .collect();
        ArtifactMask {
            sampling_rate,
            valid,
        }
    }

    /// Contiguous valid runs as half-open index ranges, at least `min_len` long
    pub fn valid_segments(&self, min_len: usize) -> Vec<(usize, usize)> {
        let mut segments = Vec::new();
        let mut start: Option<usize> = None;

        for (i, &valid) in self.valid.iter().enumerate() {
            match (valid, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    if i - s >= min_len.max(1) {
                        segments.push((s, i));
                    }
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            if self.valid.len() - s >= min_len.max(1) {
                segments.push((s, self.valid.len()));
            }
        }

        segments
    }
}

/// Source of an artifact region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Interval annotation matching the artifact marker
    Annotated,
    /// Missing pulse/heartbeat markers
    HeartbeatGap,
}

/// Time span excluded from analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRegion {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub kind: ArtifactKind,
}

impl ArtifactRegion {
    pub fn new(start_time: f64, end_time: f64, kind: ArtifactKind) -> Self {
        Self {
            start_time,
            end_time,
            duration: end_time - start_time,
            kind,
        }
    }

    /// Seconds of overlap with `[start, end)`
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end_time.min(end) - self.start_time.max(start)).max(0.0)
    }
}

/// Mask and regions produced once per recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactScan {
    pub mask: ArtifactMask,
    pub regions: Vec<ArtifactRegion>,
}

impl ArtifactScan {
    /// Regions long enough to be reported
    pub fn reportable_regions(&self, min_duration: f64) -> Vec<ArtifactRegion> {
        self.regions
            .iter()
            .filter(|r| r.duration >= min_duration)
            .cloned()
            .collect()
    }
}

/// Aggregate artifact statistics for the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub count: usize,
    pub duration_minutes: f64,
    /// Fraction of samples flagged invalid (0-1)
    pub invalid_fraction: f64,
}

/// Whether a metric could be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Computed,
    /// No channel with the required role
    MissingSignal,
    /// Too few samples or events left after filtering
    InsufficientData,
}

/// ECG analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgAnalysisResult {
    pub status: MetricStatus,
    /// Channel the metrics were derived from
    pub channel: Option<String>,
    /// Median heart rate (bpm)
    pub avg_heart_rate: Option<f64>,
    /// 5th percentile heart rate (bpm)
    pub min_heart_rate: Option<f64>,
    /// 95th percentile heart rate (bpm)
    pub max_heart_rate: Option<f64>,
    /// SDNN (ms)
    pub heart_rate_variability: Option<f64>,
    pub tachycardia_events: u32,
    pub bradycardia_events: u32,
    /// Detected R-peak sample indices
    pub r_peaks: Vec<usize>,
    /// Number of RR intervals that passed plausibility filtering
    pub valid_rr_intervals: usize,
}

impl EcgAnalysisResult {
    pub fn empty(status: MetricStatus) -> Self {
        Self {
            status,
            channel: None,
            avg_heart_rate: None,
            min_heart_rate: None,
            max_heart_rate: None,
            heart_rate_variability: None,
            tachycardia_events: 0,
            bradycardia_events: 0,
            r_peaks: Vec::new(),
            valid_rr_intervals: 0,
        }
    }

    pub fn insufficient_data(&self) -> bool {
        self.status == MetricStatus::InsufficientData
    }

    /// Total annotated arrhythmia events
    pub fn arrhythmia_events(&self) -> u32 {
        self.tachycardia_events + self.bradycardia_events
    }
}

/// Breathing-cycle peaks found in one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPeaks {
    pub channel: String,
    pub peaks: Vec<usize>,
    /// Rate estimate for this channel (breaths/min)
    pub rate: Option<f64>,
}

/// Respiration analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespirationAnalysisResult {
    pub status: MetricStatus,
    /// Channels selected as respiratory
    pub channels: Vec<String>,
    /// Mean of per-channel rates (breaths/min)
    pub avg_resp_rate: Option<f64>,
    /// 10th percentile of pooled rates
    pub min_resp_rate: Option<f64>,
    /// 90th percentile of pooled rates
    pub max_resp_rate: Option<f64>,
    pub breath_peaks: Vec<ChannelPeaks>,
    /// Annotated apneas, reported alongside the signal-derived rate
    pub annotated_apneas: Option<u32>,
    pub annotated_hypopneas: Option<u32>,
}

impl RespirationAnalysisResult {
    pub fn empty(status: MetricStatus) -> Self {
        Self {
            status,
            channels: Vec::new(),
            avg_resp_rate: None,
            min_resp_rate: None,
            max_resp_rate: None,
            breath_peaks: Vec::new(),
            annotated_apneas: None,
            annotated_hypopneas: None,
        }
    }
}

/// SpO2 analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spo2AnalysisResult {
    pub status: MetricStatus,
    pub channel: Option<String>,
    /// Median saturation (%)
    pub avg_spo2: Option<f64>,
    /// 1st percentile (%)
    pub min_spo2: Option<f64>,
    /// 90th percentile (%)
    pub spo2_baseline: Option<f64>,
    /// Minutes below 90%
    pub time_below_90: Option<f64>,
    /// Minutes below 85%
    pub time_below_85: Option<f64>,
}

impl Spo2AnalysisResult {
    pub fn empty(status: MetricStatus) -> Self {
        Self {
            status,
            channel: None,
            avg_spo2: None,
            min_spo2: None,
            spo2_baseline: None,
            time_below_90: None,
            time_below_85: None,
        }
    }
}

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Wake,
    N1,
    N2,
    N3,
    Rem,
    Unknown,
}

impl SleepStage {
    pub const ALL: [SleepStage; 6] = [
        SleepStage::Wake,
        SleepStage::N1,
        SleepStage::N2,
        SleepStage::N3,
        SleepStage::Rem,
        SleepStage::Unknown,
    ];

    pub fn is_sleep(&self) -> bool {
        matches!(
            self,
            SleepStage::N1 | SleepStage::N2 | SleepStage::N3 | SleepStage::Rem
        )
    }

    /// Single-character hypnogram code
    pub fn code(&self) -> &'static str {
        match self {
            SleepStage::Wake => "W",
            SleepStage::N1 => "1",
            SleepStage::N2 => "2",
            SleepStage::N3 => "3",
            SleepStage::Rem => "R",
            SleepStage::Unknown => "?",
        }
    }
}

/// One scored epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredEpoch {
    pub onset: f64,
    pub stage: SleepStage,
}

/// Stage per fixed-duration epoch, ordered by onset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypnogram {
    /// Epoch length (seconds)
    pub epoch_duration: f64,
    pub epochs: Vec<ScoredEpoch>,
}

impl Hypnogram {
    pub fn epoch_minutes(&self) -> f64 {
        self.epoch_duration / 60.0
    }

    pub fn count(&self, stage: SleepStage) -> usize {
        self.epochs.iter().filter(|e| e.stage == stage).count()
    }

    /// Compact export: epoch count, epoch length, stage codes
    pub fn export(&self) -> HypnogramExport {
        HypnogramExport {
            e: self.epochs.len(),
            d: self.epoch_duration,
            s: self.epochs.iter().map(|e| e.stage.code().to_string()).collect(),
        }
    }
}

/// Compact hypnogram representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypnogramExport {
    pub e: usize,
    pub d: f64,
    pub s: Vec<String>,
}

/// Time spent in one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub epochs: usize,
    pub minutes: f64,
    /// N1, N2, N3 and REM: share of total sleep time.
    /// Wake and Unknown: share of time in bed.
    ///
    /// `None` when the base is zero. See
    /// [`SleepStageArchitecture::percentage_of_sleep`] for every stage on the
    /// total sleep time base.
    pub percentage: Option<f64>,
}

/// Efficiency figures derived from a hypnogram and the bed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepEfficiency {
    /// Total sleep time (minutes)
    pub total_sleep_time: f64,
    /// Lights-off to lights-on (minutes)
    pub time_in_bed: f64,
    /// TST / TIB × 100, clamped to 0-100
    pub sleep_efficiency: Option<f64>,
    /// Lights-off to first sleep epoch (minutes)
    pub sleep_latency: Option<f64>,
    /// Wake after sleep onset (minutes)
    pub waso: f64,
}

/// REM sub-score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemQuality {
    /// 0-100
    pub score: f64,
    pub rem_minutes: f64,
    pub rem_events: u32,
    /// REM events per REM minute
    pub rem_density: f64,
}

/// Sleep stage architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStageArchitecture {
    pub stages: BTreeMap<SleepStage, StageSummary>,
    pub total_sleep_time: f64,
    pub time_in_bed: f64,
    pub sleep_efficiency: Option<f64>,
    pub sleep_latency: Option<f64>,
    pub waso: f64,
    /// Sleep onset to first REM epoch (minutes)
    pub rem_latency: Option<f64>,
    pub rem_cycles: u32,
    pub rem_quality: Option<RemQuality>,
    pub hypnogram: Hypnogram,
}

impl SleepStageArchitecture {
    pub fn stage(&self, stage: SleepStage) -> StageSummary {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }

    /// Reported percentage, on the base documented on [`StageSummary::percentage`]
    pub fn percentage(&self, stage: SleepStage) -> Option<f64> {
        self.stages.get(&stage).and_then(|s| s.percentage)
    }

    /// Stage minutes as a share of total sleep time, Wake and Unknown included
    pub fn percentage_of_sleep(&self, stage: SleepStage) -> Option<f64> {
        (self.total_sleep_time > 0.0)
            .then(|| self.stage(stage).minutes / self.total_sleep_time * 100.0)
    }

    pub fn sleep_hours(&self) -> f64 {
        self.total_sleep_time / 60.0
    }
}

/// Respiratory event counts per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespiratoryEventCounts {
    pub obstructive_apneas: u32,
    pub central_apneas: u32,
    pub mixed_apneas: u32,
    pub obstructive_hypopneas: u32,
    pub central_hypopneas: u32,
    pub mixed_hypopneas: u32,
    pub desaturations: u32,
    pub snores: u32,
    pub cheyne_stokes: u32,
}

impl RespiratoryEventCounts {
    pub fn apneas(&self) -> u32 {
        self.obstructive_apneas + self.central_apneas + self.mixed_apneas
    }

    pub fn hypopneas(&self) -> u32 {
        self.obstructive_hypopneas + self.central_hypopneas + self.mixed_hypopneas
    }
}

/// Respiratory event counts normalized per hour of sleep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespiratoryEventIndex {
    pub counts: RespiratoryEventCounts,
    pub total_apneas: u32,
    pub total_hypopneas: u32,
    pub ahi: Option<f64>,
    pub ahi_obstructive: Option<f64>,
    pub ahi_central: Option<f64>,
    pub ahi_mixed: Option<f64>,
    pub apnea_index: Option<f64>,
    pub hypopnea_index: Option<f64>,
    pub odi: Option<f64>,
    pub snore_index: Option<f64>,
    /// Denominator used for every index (hours)
    pub sleep_hours: f64,
}

/// Sleep fragmentation figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragmentation {
    pub arousals: u32,
    pub limb_movements: u32,
    pub periodic_limb_movements: u32,
    pub bruxism_events: u32,
    /// Arousals per hour of sleep
    pub arousal_index: Option<f64>,
    /// Periodic limb movements per hour of sleep
    pub plmi: Option<f64>,
    /// Arousals and limb movements per hour of sleep
    pub fragmentation_index: Option<f64>,
}

/// Overall quality band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => QualityStatus::Excellent,
            70..=84 => QualityStatus::Good,
            50..=69 => QualityStatus::Fair,
            _ => QualityStatus::Poor,
        }
    }
}

/// Points contributed by each factor of the composite score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub efficiency: f64,
    pub deep_sleep: f64,
    pub rem_sleep: f64,
    pub ahi: f64,
    pub arousal: f64,
    pub rem_quality: f64,
    pub arrhythmia_penalty: f64,
    pub rem_cycle_bonus: f64,
}

impl QualityBreakdown {
    pub fn total(&self) -> f64 {
        self.efficiency
            + self.deep_sleep
            + self.rem_sleep
            + self.ahi
            + self.arousal
            + self.rem_quality
            + self.arrhythmia_penalty
            + self.rem_cycle_bonus
    }
}

/// Composite sleep quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepQualityScore {
    /// 0-100
    pub score: u8,
    pub status: QualityStatus,
    /// Unclamped sum of the breakdown
    pub raw_total: f64,
    pub breakdown: QualityBreakdown,
}

/// Structured result of one recording's analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub recording_id: String,
    pub duration_minutes: f64,
    pub ecg: EcgAnalysisResult,
    pub respiration: RespirationAnalysisResult,
    pub spo2: Spo2AnalysisResult,
    pub architecture: SleepStageArchitecture,
    pub respiratory_events: RespiratoryEventIndex,
    pub fragmentation: Fragmentation,
    pub quality: SleepQualityScore,
    pub artifact_regions: Vec<ArtifactRegion>,
    pub artifacts: ArtifactSummary,
    /// Annotations dropped as malformed
    pub skipped_annotations: usize,
}

/// Producer metadata embedded in every encoded report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Where a report came from and when it was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProvenance {
    pub recording_id: String,
    /// Recording source (file path or "inline")
    pub source: String,
    pub computed_at_utc: String,
}

/// Versioned report envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub report: AnalysisReport,
}

//! Analysis configuration
//!
//! Every threshold the engine uses lives here with its default. Configuration
//! can be loaded from JSON or TOML; missing fields take their defaults and the
//! result is validated before any analysis starts.

use crate::error::AnalysisError;
use crate::labels::{default_event_table, default_stage_table, EventCategory, LabelTable, Marker};
use crate::tiers::Tiers;
use crate::types::{Channel, ChannelRole, SleepStage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of concurrent recordings in batch mode
pub const DEFAULT_WORKERS: usize = 10;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ecg: EcgConfig,
    pub respiration: RespirationConfig,
    pub spo2: Spo2Config,
    pub artifact: ArtifactConfig,
    pub sleep: SleepConfig,
    pub quality: QualityConfig,
    pub channels: ChannelKeywords,
    pub labels: LabelConfig,
    pub batch: BatchConfig,
}

/// ECG R-peak detection and heart rate plausibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgConfig {
    /// Shortest plausible RR interval (s)
    pub rr_min: f64,
    /// Longest plausible RR interval (s)
    pub rr_max: f64,
    /// Heart rate band used for min/max heart rate (bpm)
    pub hr_min: f64,
    pub hr_max: f64,
    pub bandpass_low: f64,
    pub bandpass_high: f64,
    pub filter_order: usize,
    pub threshold_percentile: f64,
    pub peak_min_distance_s: f64,
    /// Median filter window applied to the squared signal (s)
    pub smoothing_window_s: f64,
    /// Valid RR intervals required before heart rate is reported
    pub min_rr_intervals: usize,
}

impl Default for EcgConfig {
    fn default() -> Self {
        Self {
            rr_min: 0.3,
            rr_max: 2.0,
            hr_min: 40.0,
            hr_max: 150.0,
            bandpass_low: 5.0,
            bandpass_high: 35.0,
            filter_order: 3,
            threshold_percentile: 85.0,
            peak_min_distance_s: 0.3,
            smoothing_window_s: 0.1,
            min_rr_intervals: 1,
        }
    }
}

/// Breathing-cycle detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespirationConfig {
    /// Plausible rate band (breaths/min)
    pub min_rate: f64,
    pub max_rate: f64,
    pub apply_filter: bool,
    pub filter_low: f64,
    pub filter_high: f64,
    pub filter_order: usize,
    pub peak_distance_s: f64,
    pub prominence: f64,
    pub height: f64,
    pub width_s: f64,
    /// Window for prominence computation (s)
    pub wlen_s: f64,
    /// Relaxed thresholds used when the strict pass finds fewer than 3 peaks
    pub fallback_prominence: f64,
    pub fallback_height: f64,
    /// Valid segments shorter than this are not analyzed (s)
    pub min_segment_s: f64,
    /// Cap on the number of respiratory channels analyzed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_channels: Option<usize>,
    /// Drop breathing rates outside the Tukey fences, per channel and again
    /// over the pooled rates
    pub iqr_trim: bool,
}

impl Default for RespirationConfig {
    fn default() -> Self {
        Self {
            min_rate: 8.0,
            max_rate: 25.0,
            apply_filter: true,
            filter_low: 0.1,
            filter_high: 1.0,
            filter_order: 3,
            peak_distance_s: 0.6,
            prominence: 0.05,
            height: 0.02,
            width_s: 0.2,
            wlen_s: 2.0,
            fallback_prominence: 0.02,
            fallback_height: 0.01,
            min_segment_s: 20.0,
            max_channels: None,
            iqr_trim: false,
        }
    }
}

/// Oxygen saturation plausibility and thresholds (%)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spo2Config {
    pub min_valid: f64,
    pub max_valid: f64,
    pub threshold_90: f64,
    pub threshold_85: f64,
}

impl Default for Spo2Config {
    fn default() -> Self {
        Self {
            min_valid: 75.0,
            max_valid: 100.0,
            threshold_90: 90.0,
            threshold_85: 85.0,
        }
    }
}

/// Artifact masking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Interval annotations marking artifacts
    pub marker: Marker,
    /// Point annotations emitted per detected pulse
    pub pulse_marker: Marker,
    pub detect_heartbeat_gaps: bool,
    /// Longest expected pause between pulse markers (s)
    pub max_gap: f64,
    /// Shortest trimmed gap reported as an artifact (s)
    pub min_gap_duration: f64,
    /// Regions shorter than this are kept in the mask but not reported (s)
    pub min_reportable_duration: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            marker: Marker::contains("blockArtefact"),
            pulse_marker: Marker::exact("pointIlluminationSensorValue"),
            detect_heartbeat_gaps: true,
            max_gap: 5.0,
            min_gap_duration: 10.0,
            min_reportable_duration: 0.0,
        }
    }
}

/// Denominator used for per-hour indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum IndexDenominator {
    /// Hours of scored sleep
    #[default]
    TotalSleepTime,
    /// Hours of scored sleep minus artifact time overlapping sleep epochs
    ExcludeArtifacts {
        /// Also subtract regions below `min_reportable_duration`
        include_short_regions: bool,
    },
}

/// Hypnogram scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Scoring epoch length (s)
    pub epoch_duration: f64,
    /// Allowed deviation of an annotation from a whole number of epochs (s)
    pub epoch_tolerance: f64,
    pub lights_off: Marker,
    pub lights_on: Marker,
    pub index_denominator: IndexDenominator,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            epoch_duration: 30.0,
            epoch_tolerance: 1.0,
            lights_off: Marker::contains("Lights off"),
            lights_on: Marker::contains("Lights on"),
            index_denominator: IndexDenominator::TotalSleepTime,
        }
    }
}

/// Composite score weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Sleep efficiency (%)
    pub efficiency_weights: Tiers,
    /// N3 share of total sleep time (%)
    pub n3_threshold: Tiers,
    /// REM share of total sleep time (%)
    pub rem_threshold: Tiers,
    pub ahi_weights: Tiers,
    pub arousal_weights: Tiers,
    /// Multiplier applied to the 0-100 REM sub-score
    pub rem_quality_weight: f64,
    /// Applied to tachycardia + bradycardia count
    pub arrhythmia_penalty_tiers: Tiers,
    pub rem_cycle_bonus_tiers: Tiers,
    /// REM sub-score: minutes of REM
    pub rem_time_tiers: Tiers,
    /// REM sub-score: REM events per REM minute
    pub rem_density_tiers: Tiers,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            efficiency_weights: Tiers::at_least(&[(85.0, 25.0), (70.0, 20.0), (50.0, 10.0)]),
            n3_threshold: Tiers::at_least(&[(15.0, 15.0)]),
            rem_threshold: Tiers::at_least(&[(20.0, 15.0)]),
            ahi_weights: Tiers::below(&[(5.0, 30.0), (15.0, 20.0), (30.0, 10.0)]),
            arousal_weights: Tiers::below(&[(10.0, 15.0), (20.0, 10.0)]),
            rem_quality_weight: 0.15,
            arrhythmia_penalty_tiers: Tiers::above(&[(10.0, -15.0), (5.0, -10.0), (0.0, -5.0)]),
            rem_cycle_bonus_tiers: Tiers::at_least(&[(4.0, 10.0), (3.0, 5.0)]),
            rem_time_tiers: Tiers::at_least(&[(15.0, 40.0), (5.0, 20.0)]),
            rem_density_tiers: Tiers::at_least(&[(1.5, 60.0), (0.5, 30.0)]),
        }
    }
}

/// Case-insensitive keywords identifying channel roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelKeywords {
    pub cardiac: Vec<String>,
    pub respiratory: Vec<String>,
    pub oxygen: Vec<String>,
}

impl Default for ChannelKeywords {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            cardiac: owned(&["ecg", "ekg", "electrocardiogram"]),
            respiratory: owned(&[
                "resp", "breath", "thorax", "chest", "abdomen", "flow", "rip", "дыхание",
            ]),
            oxygen: owned(&["spo2", "sao2", "sat"]),
        }
    }
}

impl ChannelKeywords {
    pub fn keywords(&self, role: ChannelRole) -> &[String] {
        match role {
            ChannelRole::Cardiac => &self.cardiac,
            ChannelRole::Respiratory => &self.respiratory,
            ChannelRole::Oxygen => &self.oxygen,
        }
    }

    pub fn matches(&self, role: ChannelRole, name: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords(role)
            .iter()
            .any(|kw| name.contains(&kw.to_lowercase()))
    }

    /// Channels carrying `role`, in recording order
    pub fn select<'a>(&self, role: ChannelRole, channels: &'a [Channel]) -> Vec<&'a Channel> {
        channels
            .iter()
            .filter(|c| self.matches(role, &c.name))
            .collect()
    }
}

/// Annotation label tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub stages: LabelTable<SleepStage>,
    pub events: LabelTable<EventCategory>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            stages: default_stage_table(),
            events: default_event_table(),
        }
    }
}

/// Batch orchestration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml(text: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&text),
            _ => Self::from_json(&text),
        }
    }

    pub fn to_toml(&self) -> Result<String, AnalysisError> {
        toml::to_string_pretty(self).map_err(|e| AnalysisError::EncodingError(e.to_string()))
    }

    /// Reject malformed or out-of-range settings
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.validate_ecg()?;
        self.validate_respiration()?;
        self.validate_spo2()?;
        self.validate_artifact()?;
        self.validate_sleep()?;
        self.validate_quality()?;

        if self.batch.workers == 0 {
            return Err(config_error("batch.workers must be at least 1"));
        }
        Ok(())
    }

    fn validate_ecg(&self) -> Result<(), AnalysisError> {
        let ecg = &self.ecg;
        require_finite(
            "ecg",
            &[
                ecg.rr_min,
                ecg.rr_max,
                ecg.hr_min,
                ecg.hr_max,
                ecg.bandpass_low,
                ecg.bandpass_high,
                ecg.threshold_percentile,
                ecg.peak_min_distance_s,
                ecg.smoothing_window_s,
            ],
        )?;
        if ecg.rr_min <= 0.0 || ecg.rr_min >= ecg.rr_max {
            return Err(config_error(format!(
                "ecg.rr_min ({}) must be positive and below ecg.rr_max ({})",
                ecg.rr_min, ecg.rr_max
            )));
        }
        if ecg.hr_min >= ecg.hr_max {
            return Err(config_error("ecg.hr_min must be below ecg.hr_max"));
        }
        validate_band("ecg", ecg.bandpass_low, ecg.bandpass_high, ecg.filter_order)?;
        if !(0.0..=100.0).contains(&ecg.threshold_percentile) {
            return Err(config_error("ecg.threshold_percentile must be within 0-100"));
        }
        if ecg.peak_min_distance_s <= 0.0 || ecg.smoothing_window_s <= 0.0 {
            return Err(config_error(
                "ecg.peak_min_distance_s and ecg.smoothing_window_s must be positive",
            ));
        }
        Ok(())
    }

    fn validate_respiration(&self) -> Result<(), AnalysisError> {
        let resp = &self.respiration;
        require_finite(
            "respiration",
            &[
                resp.min_rate,
                resp.max_rate,
                resp.filter_low,
                resp.filter_high,
                resp.peak_distance_s,
                resp.prominence,
                resp.height,
                resp.width_s,
                resp.wlen_s,
                resp.fallback_prominence,
                resp.fallback_height,
                resp.min_segment_s,
            ],
        )?;
        if resp.min_rate <= 0.0 || resp.min_rate >= resp.max_rate {
            return Err(config_error(
                "respiration.min_rate must be positive and below respiration.max_rate",
            ));
        }
        validate_band(
            "respiration",
            resp.filter_low,
            resp.filter_high,
            resp.filter_order,
        )?;
        if resp.peak_distance_s <= 0.0 {
            return Err(config_error("respiration.peak_distance_s must be positive"));
        }
        if resp.width_s < 0.0 || resp.wlen_s < 0.0 || resp.min_segment_s < 0.0 {
            return Err(config_error(
                "respiration.width_s, wlen_s and min_segment_s must not be negative",
            ));
        }
        if resp.max_channels == Some(0) {
            return Err(config_error("respiration.max_channels must be at least 1"));
        }
        Ok(())
    }

    fn validate_spo2(&self) -> Result<(), AnalysisError> {
        let spo2 = &self.spo2;
        require_finite(
            "spo2",
            &[
                spo2.min_valid,
                spo2.max_valid,
                spo2.threshold_90,
                spo2.threshold_85,
            ],
        )?;
        if spo2.min_valid >= spo2.max_valid {
            return Err(config_error("spo2.min_valid must be below spo2.max_valid"));
        }
        Ok(())
    }

    fn validate_artifact(&self) -> Result<(), AnalysisError> {
        let artifact = &self.artifact;
        require_finite(
            "artifact",
            &[
                artifact.max_gap,
                artifact.min_gap_duration,
                artifact.min_reportable_duration,
            ],
        )?;
        if artifact.marker.pattern.is_empty() {
            return Err(config_error("artifact.marker.pattern must not be empty"));
        }
        if artifact.max_gap <= 0.0 {
            return Err(config_error("artifact.max_gap must be positive"));
        }
        if artifact.min_gap_duration < 0.0 || artifact.min_reportable_duration < 0.0 {
            return Err(config_error(
                "artifact durations must not be negative",
            ));
        }
        Ok(())
    }

    fn validate_sleep(&self) -> Result<(), AnalysisError> {
        let sleep = &self.sleep;
        require_finite("sleep", &[sleep.epoch_duration, sleep.epoch_tolerance])?;
        if sleep.epoch_duration <= 0.0 {
            return Err(config_error("sleep.epoch_duration must be positive"));
        }
        if sleep.epoch_tolerance < 0.0 || sleep.epoch_tolerance >= sleep.epoch_duration / 2.0 {
            return Err(config_error(
                "sleep.epoch_tolerance must be within [0, epoch_duration / 2)",
            ));
        }
        Ok(())
    }

    fn validate_quality(&self) -> Result<(), AnalysisError> {
        let q = &self.quality;
        let named = [
            ("quality.efficiency_weights", &q.efficiency_weights),
            ("quality.n3_threshold", &q.n3_threshold),
            ("quality.rem_threshold", &q.rem_threshold),
            ("quality.ahi_weights", &q.ahi_weights),
            ("quality.arousal_weights", &q.arousal_weights),
            ("quality.arrhythmia_penalty_tiers", &q.arrhythmia_penalty_tiers),
            ("quality.rem_cycle_bonus_tiers", &q.rem_cycle_bonus_tiers),
            ("quality.rem_time_tiers", &q.rem_time_tiers),
            ("quality.rem_density_tiers", &q.rem_density_tiers),
        ];
        for (name, tiers) in named {
            tiers.validate(name).map_err(AnalysisError::Configuration)?;
        }
        if !q.rem_quality_weight.is_finite() || q.rem_quality_weight < 0.0 {
            return Err(config_error(
                "quality.rem_quality_weight must be a non-negative number",
            ));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::Configuration(msg.into())
}

fn require_finite(section: &str, values: &[f64]) -> Result<(), AnalysisError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(config_error(format!("{section}: all values must be finite")))
    }
}

fn validate_band(section: &str, low: f64, high: f64, order: usize) -> Result<(), AnalysisError> {
    if low <= 0.0 || low >= high {
        return Err(config_error(format!(
            "{section}: band-pass low cutoff ({low}) must be positive and below the high cutoff ({high})"
        )));
    }
    if !(1..=8).contains(&order) {
        return Err(config_error(format!(
            "{section}: filter order must be within 1-8, got {order}"
        )));
    }
    Ok(())
}

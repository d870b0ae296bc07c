//! Pipeline orchestration
//!
//! This module provides the public API for Synheart PSG.
//! It orchestrates the full pipeline from a decoded recording to the report.

use crate::artifact::ArtifactProcessor;
use crate::config::AnalysisConfig;
use crate::encoder::ReportEncoder;
use crate::error::AnalysisError;
use crate::signal::SignalAnalyzer;
use crate::sleep::SleepAnalyzer;
use crate::source::{JsonRecordingSource, RecordingSource};
use crate::types::{AnalysisReport, AnnotationEvent, Recording, ReportPayload};
use std::path::Path;
use tracing::{debug, warn};

/// Drop malformed annotations and sort the rest by onset.
///
/// Returns the cleaned stream and the number of entries dropped.
pub fn sanitize_annotations(annotations: &[AnnotationEvent]) -> (Vec<AnnotationEvent>, usize) {
    let mut skipped = 0;
    let mut clean: Vec<AnnotationEvent> = annotations
        .iter()
        .filter(|a| {
            let problem = if !a.onset.is_finite() || !a.duration.is_finite() {
                Some("non-finite onset or duration")
            } else if a.duration < 0.0 {
                Some("negative duration")
            } else {
                None
            };
            if let Some(problem) = problem {
                let err = AnalysisError::MalformedAnnotation(format!(
                    "'{}' at {}: {problem}",
                    a.label, a.onset
                ));
                warn!(error = %err, "skipping annotation");
                skipped += 1;
            }
            problem.is_none()
        })
        .cloned()
        .collect();

    // Stable, so simultaneous annotations keep their input order
    clean.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    (clean, skipped)
}

/// Analyze one decoded recording.
///
/// Pipeline stages:
/// 1. Annotation sanitizing - drop malformed entries, sort by onset
/// 2. ArtifactProcessor - validity mask and artifact regions
/// 3. SignalAnalyzer - ECG, respiration and SpO2 metrics
/// 4. SleepAnalyzer - architecture, event indices and quality score
///
/// # Example
/// ```ignore
/// let config = AnalysisConfig::default();
/// let report = analyze_recording(&recording, &config)?;
/// println!("AHI: {:?}", report.respiratory_events.ahi);
/// ```
pub fn analyze_recording(
    recording: &Recording,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    config.validate()?;
    if !(recording.sampling_rate.is_finite() && recording.sampling_rate > 0.0) {
        return Err(AnalysisError::ParseError(format!(
            "recording '{}' has invalid sampling rate {}",
            recording.id, recording.sampling_rate
        )));
    }

    // Stage 1: Clean the annotation stream
    let (annotations, skipped_annotations) = sanitize_annotations(&recording.annotations);

    // Stage 2: Artifact mask at the recording rate
    let fs = recording.sampling_rate;
    let sample_count = recording.sample_count();
    let artifacts = ArtifactProcessor::new(&config.artifact);
    let scan = artifacts.scan(sample_count, fs, &annotations)?;
    let artifact_summary = artifacts.summary(&scan);
    debug!(
        recording = %recording.id,
        samples = sample_count,
        regions = scan.regions.len(),
        "artifact scan complete"
    );

    // Stage 3: Per-signal metrics
    let signals = SignalAnalyzer::new(config);
    let ecg = signals.analyze_ecg(&recording.channels, fs, &scan.mask, &annotations);
    let respiration =
        signals.analyze_respiration(&recording.channels, fs, &scan.mask, Some(&annotations));
    let spo2 = signals.analyze_spo2(&recording.channels, fs, &scan.mask);

    // Stage 4: Sleep architecture, indices and score
    let sleep = SleepAnalyzer::new(config);
    let architecture = sleep.calculate_architecture(&annotations);
    let index_hours = sleep.index_hours(&architecture, &scan.regions);
    let counts = sleep.calculate_respiratory_events(&annotations);
    let respiratory_events = sleep.calculate_indices(counts, index_hours);
    let fragmentation = sleep.calculate_fragmentation(&annotations, architecture.sleep_hours());
    let quality = sleep.calculate_sleep_quality(
        &architecture,
        &ecg,
        &respiratory_events,
        fragmentation.arousal_index,
    );
    debug!(recording = %recording.id, score = quality.score, "recording analyzed");

    Ok(AnalysisReport {
        recording_id: recording.id.clone(),
        duration_minutes: recording.duration_secs() / 60.0,
        ecg,
        respiration,
        spo2,
        architecture,
        respiratory_events,
        fragmentation,
        quality,
        artifact_regions: scan.reportable_regions(config.artifact.min_reportable_duration),
        artifacts: artifact_summary,
        skipped_annotations,
    })
}

/// Analyze a JSON-encoded recording and return the encoded report.
///
/// # Arguments
/// * `recording_json` - Decoded recording as JSON
/// * `config_json` - Optional configuration overrides as JSON
///
/// # Returns
/// Report payload JSON
pub fn recording_json_to_report(
    recording_json: &str,
    config_json: Option<&str>,
) -> Result<String, AnalysisError> {
    let processor = match config_json {
        Some(json) => PsgProcessor::with_config(AnalysisConfig::from_json(json)?)?,
        None => PsgProcessor::new(),
    };
    let payload = processor.process_json(recording_json, "recording", "inline")?;
    serde_json::to_string_pretty(&payload).map_err(AnalysisError::JsonError)
}

/// Reusable processor holding a validated configuration and one encoder.
///
/// Use this when analyzing many recordings with the same settings.
#[derive(Debug, Clone)]
pub struct PsgProcessor {
    config: AnalysisConfig,
    encoder: ReportEncoder,
}

impl Default for PsgProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PsgProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            encoder: ReportEncoder::new(),
        }
    }

    /// Create a processor with a validated configuration
    pub fn with_config(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: ReportEncoder::new(),
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Replace the configuration from JSON
    pub fn load_config(&mut self, json: &str) -> Result<(), AnalysisError> {
        self.config = AnalysisConfig::from_json(json)?;
        Ok(())
    }

    /// Analyze an already decoded recording
    pub fn process_recording(
        &self,
        recording: &Recording,
        source: &str,
    ) -> Result<ReportPayload, AnalysisError> {
        let report = analyze_recording(recording, &self.config)?;
        Ok(self.encoder.encode(report, source))
    }

    /// Decode JSON with [`JsonRecordingSource`] and analyze it
    pub fn process_json(
        &self,
        raw_json: &str,
        fallback_id: &str,
        source: &str,
    ) -> Result<ReportPayload, AnalysisError> {
        let sourced = JsonRecordingSource.parse(raw_json, fallback_id)?;
        let mut payload = self.process_recording(&sourced.recording, source)?;
        payload.report.skipped_annotations += sourced.skipped_annotations;
        Ok(payload)
    }

    /// Read, decode and analyze a recording file; the file stem is the
    /// fallback recording id
    pub fn process_file(&self, path: &Path) -> Result<ReportPayload, AnalysisError> {
        let raw = std::fs::read_to_string(path)?;
        let fallback_id = recording_id_for(path);
        self.process_json(&raw, &fallback_id, &path.display().to_string())
    }
}

/// File stem used when a recording carries no id
pub fn recording_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

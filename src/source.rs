//! Recording sources
//!
//! A source decodes an external container into a [`Recording`]: named
//! channels, sampling rates and the annotation stream. Container parsing
//! stays outside the engine; the JSON source below reads the decoded form.

use crate::error::AnalysisError;
use crate::types::{AnnotationEvent, Channel, Recording};
use serde::Deserialize;
use tracing::warn;

/// Decoded recording plus the number of annotation entries that could not be
/// read
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedRecording {
    pub recording: Recording,
    pub skipped_annotations: usize,
}

/// Trait for recording decoders
pub trait RecordingSource {
    /// Decode `raw` into a recording; `fallback_id` names it when the input
    /// carries no identifier
    fn parse(&self, raw: &str, fallback_id: &str) -> Result<SourcedRecording, AnalysisError>;
}

/// Reads recordings already decoded to JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordingSource;

#[derive(Debug, Deserialize)]
struct RawRecording {
    #[serde(default)]
    id: Option<String>,
    sampling_rate: f64,
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
}

impl RecordingSource for JsonRecordingSource {
    fn parse(&self, raw: &str, fallback_id: &str) -> Result<SourcedRecording, AnalysisError> {
        let payload: RawRecording = serde_json::from_str(raw)?;

        if !(payload.sampling_rate.is_finite() && payload.sampling_rate > 0.0) {
            return Err(AnalysisError::ParseError(format!(
                "sampling_rate must be positive, got {}",
                payload.sampling_rate
            )));
        }
        for channel in &payload.channels {
            if let Some(rate) = channel.sampling_rate {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(AnalysisError::ParseError(format!(
                        "channel '{}' has invalid sampling_rate {rate}",
                        channel.name
                    )));
                }
            }
        }

        // Entries are decoded one by one so a single bad entry is skipped
        let mut annotations = Vec::with_capacity(payload.annotations.len());
        let mut skipped_annotations = 0;
        for (index, entry) in payload.annotations.into_iter().enumerate() {
            match serde_json::from_value::<AnnotationEvent>(entry) {
                Ok(annotation) => annotations.push(annotation),
                Err(e) => {
                    let err = AnalysisError::MalformedAnnotation(format!("entry {index}: {e}"));
                    warn!(error = %err, "skipping annotation");
                    skipped_annotations += 1;
                }
            }
        }

        let id = payload
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        Ok(SourcedRecording {
            recording: Recording {
                id,
                sampling_rate: payload.sampling_rate,
                channels: payload.channels,
                annotations,
            },
            skipped_annotations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_recording() {
        let raw = r#"{
            "id": "night-01",
            "sampling_rate": 256,
            "channels": [
                {"name": "ECG II", "samples": [0.1, 0.2, 0.3]},
                {"name": "SpO2", "samples": [97, 96], "sampling_rate": 1}
            ],
            "annotations": [
                {"onset": 0, "duration": 30, "label": "Sleep stage W"},
                {"onset": 12.5, "label": "Snore"}
            ]
        }"#;
        let sourced = JsonRecordingSource.parse(raw, "fallback").unwrap();
        let recording = sourced.recording;

        assert_eq!(recording.id, "night-01");
        assert_eq!(recording.channels.len(), 2);
        assert_eq!(recording.channels[1].sampling_rate, Some(1.0));
        assert_eq!(
            recording.annotations[1],
            AnnotationEvent::new(12.5, 0.0, "Snore")
        );
        assert_eq!(sourced.skipped_annotations, 0);
    }

    #[test]
    fn test_malformed_annotations_are_skipped() {
        let raw = r#"{
            "sampling_rate": 100,
            "channels": [],
            "annotations": [
                {"onset": "soon", "duration": 1, "label": "Arousal"},
                {"duration": 1, "label": "Arousal"},
                {"onset": 5, "duration": 1, "label": "Arousal"}
            ]
        }"#;
        let sourced = JsonRecordingSource.parse(raw, "rec-7").unwrap();
        assert_eq!(sourced.recording.id, "rec-7");
        assert_eq!(sourced.recording.annotations.len(), 1);
        assert_eq!(sourced.skipped_annotations, 2);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let err = JsonRecordingSource
            .parse(r#"{"sampling_rate": 0, "channels": []}"#, "x")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError(_)));

        let raw = r#"{"sampling_rate": 100, "channels": [{"name": "Flow", "samples": [], "sampling_rate": -1}]}"#;
        assert!(JsonRecordingSource.parse(raw, "x").is_err());

        assert!(matches!(
            JsonRecordingSource.parse("not json", "x").unwrap_err(),
            AnalysisError::JsonError(_)
        ));
    }
}

//! Report encoding
//!
//! Wraps an [`AnalysisReport`] in a versioned envelope carrying producer and
//! provenance metadata, ready for the downstream exporter.

use crate::error::AnalysisError;
use crate::types::{AnalysisReport, ReportPayload, ReportProducer, ReportProvenance};
use crate::{PRODUCER_NAME, PSG_VERSION};
use chrono::Utc;
use uuid::Uuid;

/// Current report envelope version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for report payloads
#[derive(Debug, Clone)]
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a report produced from `source`
    pub fn encode(&self, report: AnalysisReport, source: &str) -> ReportPayload {
        ReportPayload {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: PSG_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: ReportProvenance {
                recording_id: report.recording_id.clone(),
                source: source.to_string(),
                computed_at_utc: Utc::now().to_rfc3339(),
            },
            report,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(&self, report: AnalysisReport, source: &str) -> Result<String, AnalysisError> {
        let payload = self.encode(report, source);
        serde_json::to_string_pretty(&payload).map_err(AnalysisError::JsonError)
    }
}

//! Synheart PSG - Deterministic polysomnography analysis engine
//!
//! PSG turns a decoded overnight recording (signal channels plus a time-stamped
//! annotation stream) into a structured sleep report through a deterministic
//! pipeline: artifact masking → ECG / respiration / SpO2 metrics → sleep
//! architecture → respiratory event indices → composite quality score.
//!
//! ## Modules
//!
//! - **Signals**: R-peak and breathing-cycle detection on band-passed channels
//! - **Sleep**: hypnogram, stage architecture, per-hour indices and scoring
//! - **Batch**: many recordings on a bounded worker pool

pub mod artifact;
pub mod batch;
pub mod config;
pub mod dsp;
pub mod encoder;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod signal;
pub mod sleep;
pub mod source;
pub mod tiers;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use batch::{BatchProcessor, FileOutcome};
pub use config::AnalysisConfig;
pub use encoder::ReportEncoder;
pub use error::AnalysisError;
pub use pipeline::{analyze_recording, recording_json_to_report, PsgProcessor};
pub use source::{JsonRecordingSource, RecordingSource};
pub use types::{AnalysisReport, AnnotationEvent, Channel, Recording, ReportPayload};

/// Engine version embedded in all report payloads
pub const PSG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report payloads
pub const PRODUCER_NAME: &str = "synheart-psg";

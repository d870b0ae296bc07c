//! Error types for Synheart PSG

use thiserror::Error;

/// Errors that can occur during analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Missing signal: {0}")]
    MissingSignal(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Malformed annotation: {0}")]
    MalformedAnnotation(String),

    #[error("Events are not sorted by time: {0}")]
    UnsortedEvents(String),

    #[error("Failed to parse recording: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

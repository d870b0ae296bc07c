//! Batch processing over recording files
//!
//! Each file is read, decoded, analyzed and encoded on a dedicated rayon
//! pool. Failures, panics included, stay confined to the file that caused
//! them and come back as a [`FileOutcome`] error.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::{recording_id_for, PsgProcessor};
use crate::types::ReportPayload;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of processing one file; exactly one of `report` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub recording_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.report.is_some()
    }
}

/// Runs recordings through a [`PsgProcessor`] on a bounded worker pool
pub struct BatchProcessor {
    processor: PsgProcessor,
    pool: ThreadPool,
}

impl BatchProcessor {
    /// Build a pool sized by `config.batch.workers`
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let workers = config.batch.workers;
        let processor = PsgProcessor::with_config(config)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("psg-worker-{i}"))
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("worker pool: {e}")))?;

        Ok(Self { processor, pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Process every file; outcomes follow the order of `paths`
    pub fn process_files(&self, paths: &[PathBuf]) -> Vec<FileOutcome> {
        info!(files = paths.len(), workers = self.workers(), "starting batch");
        let outcomes: Vec<FileOutcome> = self
            .pool
            .install(|| paths.par_iter().map(|path| self.process_one(path)).collect());

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            succeeded = outcomes.len() - failed,
            failed, "batch complete"
        );
        outcomes
    }

    fn process_one(&self, path: &Path) -> FileOutcome {
        let recording_id = recording_id_for(path);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.processor.process_file(path)));

        match result {
            Ok(Ok(payload)) => {
                info!(path = %path.display(), score = payload.report.quality.score, "processed");
                FileOutcome {
                    path: path.to_path_buf(),
                    recording_id: payload.report.recording_id.clone(),
                    report: Some(payload),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "failed");
                FileOutcome {
                    path: path.to_path_buf(),
                    recording_id,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
            Err(payload) => {
                let message = format!("analysis panicked: {}", panic_message(payload.as_ref()));
                warn!(path = %path.display(), error = %message, "failed");
                FileOutcome {
                    path: path.to_path_buf(),
                    recording_id,
                    report: None,
                    error: Some(message),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::sample_recording_json;
    use pretty_assertions::assert_eq;

    fn small_recording(id: Option<&str>) -> String {
        let mut value = serde_json::json!({
            "sampling_rate": 10.0,
            "channels": [{"name": "SpO2", "samples": vec![95.0; 600]}],
            "annotations": [
                {"onset": 0.0, "duration": 30.0, "label": "Sleep stage W"},
                {"onset": 30.0, "duration": 30.0, "label": "Sleep stage N2"}
            ]
        });
        if let Some(id) = id {
            value["id"] = serde_json::json!(id);
        }
        value.to_string()
    }

    #[test]
    fn test_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("night-a.json");
        let corrupt = dir.path().join("night-b.json");
        let unnamed = dir.path().join("night-c.json");
        let missing = dir.path().join("night-d.json");
        std::fs::write(&good, small_recording(Some("alpha"))).unwrap();
        std::fs::write(&corrupt, "{\"sampling_rate\": 10, \"channels\": [").unwrap();
        std::fs::write(&unnamed, small_recording(None)).unwrap();

        let mut config = AnalysisConfig::default();
        config.batch.workers = 2;
        let batch = BatchProcessor::new(config).unwrap();
        assert_eq!(batch.workers(), 2);

        let paths = vec![good, corrupt.clone(), unnamed, missing];
        let outcomes = batch.process_files(&paths);

        let ids: Vec<&str> = outcomes.iter().map(|o| o.recording_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "night-b", "night-c", "night-d"]);
        let successes: Vec<bool> = outcomes.iter().map(FileOutcome::is_success).collect();
        assert_eq!(successes, vec![true, false, true, false]);

        assert_eq!(outcomes[1].path, corrupt);
        assert!(outcomes[1].report.is_none());
        assert!(outcomes[1].error.as_deref().unwrap().contains("JSON"));
        assert_eq!(
            outcomes[2].report.as_ref().unwrap().report.spo2.avg_spo2,
            Some(95.0)
        );
    }

    #[test]
    fn test_batch_reports_match_single_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.json");
        std::fs::write(&path, sample_recording_json()).unwrap();

        let batch = BatchProcessor::new(AnalysisConfig::default()).unwrap();
        let outcome = batch.process_files(std::slice::from_ref(&path)).remove(0);
        let single = PsgProcessor::new().process_file(&path).unwrap();

        assert_eq!(outcome.report.unwrap().report, single.report);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = AnalysisConfig::default();
        config.batch.workers = 0;
        assert!(matches!(
            BatchProcessor::new(config),
            Err(AnalysisError::Configuration(_))
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(payload.as_ref()), "index out of bounds");
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

//! Composite sleep quality score

use crate::config::QualityConfig;
use crate::types::{
    EcgAnalysisResult, QualityBreakdown, QualityStatus, RespiratoryEventIndex, SleepQualityScore,
    SleepStage, SleepStageArchitecture,
};

// Keeps sums such as 8.999999999999998 from flooring one point low
const FLOOR_EPSILON: f64 = 1e-9;

/// Weighted-threshold sum of the sleep factors.
///
/// Factors are evaluated in a fixed order, each through its own tier list;
/// undefined inputs contribute nothing. The total is clamped to 0-100 and
/// floored.
pub fn calculate_sleep_quality(
    architecture: &SleepStageArchitecture,
    ecg: &EcgAnalysisResult,
    respiratory_events: &RespiratoryEventIndex,
    arousal_index: Option<f64>,
    config: &QualityConfig,
) -> SleepQualityScore {
    let breakdown = QualityBreakdown {
        efficiency: config
            .efficiency_weights
            .evaluate_opt(architecture.sleep_efficiency),
        deep_sleep: config
            .n3_threshold
            .evaluate_opt(architecture.percentage(SleepStage::N3)),
        rem_sleep: config
            .rem_threshold
            .evaluate_opt(architecture.percentage(SleepStage::Rem)),
        ahi: config.ahi_weights.evaluate_opt(respiratory_events.ahi),
        arousal: config.arousal_weights.evaluate_opt(arousal_index),
        rem_quality: architecture
            .rem_quality
            .as_ref()
            .map(|q| q.score * config.rem_quality_weight)
            .unwrap_or(0.0),
        arrhythmia_penalty: config
            .arrhythmia_penalty_tiers
            .evaluate(ecg.arrhythmia_events() as f64),
        rem_cycle_bonus: config
            .rem_cycle_bonus_tiers
            .evaluate(architecture.rem_cycles as f64),
    };

    let raw_total = breakdown.total();
    let clamped = if raw_total.is_finite() {
        raw_total.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let score = (clamped + FLOOR_EPSILON).floor().min(100.0) as u8;

    SleepQualityScore {
        score,
        status: QualityStatus::from_score(score),
        raw_total,
        breakdown,
    }
}

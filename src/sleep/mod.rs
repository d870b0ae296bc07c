//! Sleep architecture, respiratory events and composite quality
//!
//! [`SleepAnalyzer`] turns stage and event annotations into a hypnogram,
//! the per-stage architecture, per-hour event indices and the final score.
//! Every function here is pure: the same annotations and configuration
//! always produce the same result.

pub mod events;
pub mod quality;
pub mod stages;

pub use stages::BedWindow;

use crate::config::AnalysisConfig;
use crate::labels::EventCategory;
use crate::types::{
    AnnotationEvent, ArtifactRegion, EcgAnalysisResult, Fragmentation, Hypnogram,
    RespiratoryEventCounts, RespiratoryEventIndex, SleepEfficiency, SleepQualityScore,
    SleepStageArchitecture,
};
use tracing::debug;

/// Scores sleep from annotations under one configuration
#[derive(Debug, Clone, Copy)]
pub struct SleepAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> SleepAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn calculate_stages(&self, annotations: &[AnnotationEvent]) -> Hypnogram {
        let sleep = &self.config.sleep;
        stages::calculate_stages(
            annotations,
            &self.config.labels.stages,
            sleep.epoch_duration,
            sleep.epoch_tolerance,
        )
    }

    pub fn bed_window(&self, annotations: &[AnnotationEvent], hypnogram: &Hypnogram) -> BedWindow {
        stages::bed_window(annotations, hypnogram, &self.config.sleep)
    }

    pub fn calculate_efficiency(&self, hypnogram: &Hypnogram, window: &BedWindow) -> SleepEfficiency {
        stages::calculate_efficiency(hypnogram, window)
    }

    /// Full stage architecture including REM quality
    pub fn calculate_architecture(&self, annotations: &[AnnotationEvent]) -> SleepStageArchitecture {
        let hypnogram = self.calculate_stages(annotations);
        let window = self.bed_window(annotations, &hypnogram);
        let efficiency = self.calculate_efficiency(&hypnogram, &window);
        let rem_events = self
            .config
            .labels
            .events
            .count(annotations, EventCategory::RemEvent);

        debug!(
            epochs = hypnogram.epochs.len(),
            tst = efficiency.total_sleep_time,
            tib = efficiency.time_in_bed,
            "hypnogram scored"
        );
        stages::calculate_architecture(hypnogram, &efficiency, rem_events, &self.config.quality)
    }

    pub fn calculate_respiratory_events(
        &self,
        annotations: &[AnnotationEvent],
    ) -> RespiratoryEventCounts {
        events::calculate_respiratory_events(annotations, &self.config.labels.events)
    }

    /// Per-hour denominator under the configured policy
    pub fn index_hours(
        &self,
        architecture: &SleepStageArchitecture,
        regions: &[ArtifactRegion],
    ) -> f64 {
        events::index_hours(
            architecture,
            regions,
            self.config.sleep.index_denominator,
            self.config.artifact.min_reportable_duration,
        )
    }

    pub fn calculate_indices(
        &self,
        counts: RespiratoryEventCounts,
        sleep_hours: f64,
    ) -> RespiratoryEventIndex {
        events::calculate_indices(counts, sleep_hours)
    }

    pub fn calculate_fragmentation(
        &self,
        annotations: &[AnnotationEvent],
        sleep_hours: f64,
    ) -> Fragmentation {
        events::calculate_fragmentation(annotations, &self.config.labels.events, sleep_hours)
    }

    pub fn calculate_sleep_quality(
        &self,
        architecture: &SleepStageArchitecture,
        ecg: &EcgAnalysisResult,
        respiratory_events: &RespiratoryEventIndex,
        arousal_index: Option<f64>,
    ) -> SleepQualityScore {
        quality::calculate_sleep_quality(
            architecture,
            ecg,
            respiratory_events,
            arousal_index,
            &self.config.quality,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::stages::tests::epochs;
    use crate::types::{MetricStatus, SleepStage::*};

    #[test]
    fn test_no_sleep_leaves_ahi_undefined() {
        let config = AnalysisConfig::default();
        let analyzer = SleepAnalyzer::new(&config);
        let mut annotations = epochs(&[Wake, Wake, Wake]);
        annotations.push(AnnotationEvent::new(10.0, 15.0, "Obstructive Apnea"));

        let arch = analyzer.calculate_architecture(&annotations);
        assert_eq!(arch.total_sleep_time, 0.0);
        assert_eq!(arch.sleep_efficiency, Some(0.0));

        let counts = analyzer.calculate_respiratory_events(&annotations);
        let index = analyzer.calculate_indices(counts, analyzer.index_hours(&arch, &[]));
        assert_eq!(index.ahi, None);
        assert_eq!(index.odi, None);
        assert_eq!(index.total_apneas, 1);
    }

    #[test]
    fn test_full_night_scoring() {
        let config = AnalysisConfig::default();
        let analyzer = SleepAnalyzer::new(&config);

        let mut stages = vec![Wake; 2];
        for _ in 0..4 {
            stages.extend([N1, N2, N2, N2, N3, N3, N2, Rem, Rem]);
        }
        stages.push(Wake);
        let mut annotations = epochs(&stages);
        annotations.push(AnnotationEvent::new(400.0, 3.0, "Arousal"));

        let arch = analyzer.calculate_architecture(&annotations);
        assert_eq!(arch.rem_cycles, 4);
        assert_eq!(arch.total_sleep_time, 18.0);
        assert_eq!(arch.sleep_latency, Some(1.0));
        assert_eq!(arch.waso, 0.0);

        let hours = analyzer.index_hours(&arch, &[]);
        let index = analyzer.calculate_indices(analyzer.calculate_respiratory_events(&annotations), hours);
        let frag = analyzer.calculate_fragmentation(&annotations, hours);
        let ecg = EcgAnalysisResult::empty(MetricStatus::Computed);
        let score = analyzer.calculate_sleep_quality(&arch, &ecg, &index, frag.arousal_index);

        // efficiency 36/39 -> 25, N3 22% -> 15, REM 22% -> 15, AHI 0 -> 30,
        // arousal index 3.3 -> 15, REM 4 min -> 0, 4 cycles -> +10
        assert_eq!(score.score, 100);
        assert!((score.raw_total - 110.0).abs() < 1e-9);
    }
}

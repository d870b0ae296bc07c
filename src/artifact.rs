//! Artifact masking
//!
//! Builds the per-sample validity mask shared by every signal analyzer. Two
//! sources mark samples invalid: interval annotations matching the artifact
//! marker, and gaps in the per-pulse marker stream longer than the allowed
//! pause.

use crate::config::ArtifactConfig;
use crate::error::AnalysisError;
use crate::labels::Marker;
use crate::types::{
    AnnotationEvent, ArtifactKind, ArtifactMask, ArtifactRegion, ArtifactScan, ArtifactSummary,
};
use tracing::debug;

/// Derives artifact masks and regions for one recording
#[derive(Debug, Clone)]
pub struct ArtifactProcessor {
    config: ArtifactConfig,
}

impl ArtifactProcessor {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Mask and merged regions for annotations matching `marker`.
    ///
    /// Sample `i` is invalid when `onset <= i / fs < onset + duration` for any
    /// matching annotation. Regions are clipped to the recording and merged
    /// when they overlap or touch.
    pub fn get_artifact_mask(
        channels_length: usize,
        sampling_rate: f64,
        annotations: &[AnnotationEvent],
        marker: &Marker,
    ) -> (ArtifactMask, Vec<ArtifactRegion>) {
        let mut mask = ArtifactMask::all_valid(channels_length, sampling_rate);
        if sampling_rate <= 0.0 || channels_length == 0 {
            return (mask, Vec::new());
        }
        let span = channels_length as f64 / sampling_rate;

        let regions: Vec<ArtifactRegion> = annotations
            .iter()
            .filter(|a| marker.matches(&a.label))
            .filter_map(|a| clip(a.onset, a.end(), span, ArtifactKind::Annotated))
            .collect();

        for region in &regions {
            mark_invalid(&mut mask, region.start_time, region.end_time);
        }

        let regions = merge_regions(regions);
        debug!(
            regions = regions.len(),
            invalid = mask.len() - mask.valid_count(),
            "artifact annotations applied"
        );
        (mask, regions)
    }

    /// Regions where consecutive pulse markers are further apart than
    /// `max_gap`.
    ///
    /// Each region starts `max_gap` seconds after the earlier marker and ends at
    /// the later one; regions shorter than `min_duration` are dropped.
    pub fn get_heartbeat_gaps(
        pulse_times: &[f64],
        max_gap: f64,
        min_duration: f64,
    ) -> Result<Vec<ArtifactRegion>, AnalysisError> {
        if let Some(pos) = pulse_times.windows(2).position(|w| w[1] < w[0]) {
            return Err(AnalysisError::UnsortedEvents(format!(
                "pulse marker at index {} ({:.3} s) precedes the one before it ({:.3} s)",
                pos + 1,
                pulse_times[pos + 1],
                pulse_times[pos]
            )));
        }

        let gaps = pulse_times
            .windows(2)
            .filter(|w| w[1] - w[0] > max_gap)
            .filter_map(|w| {
                let start = w[0] + max_gap;
                (w[1] - start >= min_duration)
                    .then(|| ArtifactRegion::new(start, w[1], ArtifactKind::HeartbeatGap))
            })
            .collect();

        Ok(gaps)
    }

    /// Full artifact scan: annotated regions plus heartbeat gaps when enabled
    pub fn scan(
        &self,
        channels_length: usize,
        sampling_rate: f64,
        annotations: &[AnnotationEvent],
    ) -> Result<ArtifactScan, AnalysisError> {
        let (mut mask, mut regions) = Self::get_artifact_mask(
            channels_length,
            sampling_rate,
            annotations,
            &self.config.marker,
        );

        if self.config.detect_heartbeat_gaps && sampling_rate > 0.0 {
            let mut pulses: Vec<f64> = annotations
                .iter()
                .filter(|a| self.config.pulse_marker.matches(&a.label))
                .map(|a| a.onset)
                .collect();
            pulses.sort_by(|a, b| a.total_cmp(b));

            let span = channels_length as f64 / sampling_rate;
            let gaps = Self::get_heartbeat_gaps(
                &pulses,
                self.config.max_gap,
                self.config.min_gap_duration,
            )?;
            debug!(pulses = pulses.len(), gaps = gaps.len(), "heartbeat gaps detected");

            for gap in gaps {
                if let Some(gap) = clip(gap.start_time, gap.end_time, span, gap.kind) {
                    mark_invalid(&mut mask, gap.start_time, gap.end_time);
                    regions.push(gap);
                }
            }
            regions = merge_regions(regions);
        }

        Ok(ArtifactScan { mask, regions })
    }

    /// Count, duration and invalid share of the reportable regions
    pub fn summary(&self, scan: &ArtifactScan) -> ArtifactSummary {
        let reportable = scan.reportable_regions(self.config.min_reportable_duration);
        let invalid_fraction = if scan.mask.is_empty() {
            0.0
        } else {
            1.0 - scan.mask.valid_count() as f64 / scan.mask.len() as f64
        };
        ArtifactSummary {
            count: reportable.len(),
            duration_minutes: reportable.iter().map(|r| r.duration).sum::<f64>() / 60.0,
            invalid_fraction,
        }
    }
}

/// Clip `[start, end)` to `[0, span)`; empty results are dropped
fn clip(start: f64, end: f64, span: f64, kind: ArtifactKind) -> Option<ArtifactRegion> {
    let start = start.max(0.0);
    let end = end.min(span);
    (end > start).then(|| ArtifactRegion::new(start, end, kind))
}

fn mark_invalid(mask: &mut ArtifactMask, start: f64, end: f64) {
    let fs = mask.sampling_rate;
    let len = mask.len();
    let first = ((start * fs).ceil().max(0.0) as usize).min(len);
    let last = ((end * fs).ceil().max(0.0) as usize).min(len);
    for valid in &mut mask.valid[first..last] {
        *valid = false;
    }
}

/// Merge overlapping or touching regions; annotated kind wins
fn merge_regions(mut regions: Vec<ArtifactRegion>) -> Vec<ArtifactRegion> {
    regions.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut merged: Vec<ArtifactRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.start_time <= last.end_time => {
                let end = last.end_time.max(region.end_time);
                let kind = if last.kind == ArtifactKind::Annotated
                    || region.kind == ArtifactKind::Annotated
                {
                    ArtifactKind::Annotated
                } else {
                    ArtifactKind::HeartbeatGap
                };
                *last = ArtifactRegion::new(last.start_time, end, kind);
            }
            _ => merged.push(region),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marker() -> Marker {
        Marker::contains("blockArtefact")
    }

    #[test]
    fn test_no_annotations_all_valid() {
        let (mask, regions) = ArtifactProcessor::get_artifact_mask(1000, 100.0, &[], &marker());
        assert_eq!(mask.valid_count(), 1000);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_single_artifact_region() {
        let annotations = vec![
            AnnotationEvent::new(100.0, 30.0, "Артефакт(blockArtefact)"),
            AnnotationEvent::new(10.0, 30.0, "Sleep stage W"),
        ];
        let (mask, regions) =
            ArtifactProcessor::get_artifact_mask(300 * 10, 10.0, &annotations, &marker());

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start_time, 100.0);
        assert_eq!(regions[0].duration, 30.0);
        assert_eq!(mask.len() - mask.valid_count(), 300);
        assert!(mask.is_valid(999));
        assert!(!mask.is_valid(1000));
        assert!(!mask.is_valid(1299));
        assert!(mask.is_valid(1300));
    }

    #[test]
    fn test_overlapping_regions_merge_and_clip() {
        let annotations = vec![
            AnnotationEvent::new(10.0, 10.0, "blockArtefact"),
            AnnotationEvent::new(15.0, 10.0, "blockArtefact"),
            AnnotationEvent::new(25.0, 5.0, "blockArtefact"),
            AnnotationEvent::new(95.0, 20.0, "blockArtefact"),
            AnnotationEvent::new(50.0, 0.0, "blockArtefact"),
        ];
        let (mask, regions) =
            ArtifactProcessor::get_artifact_mask(100, 1.0, &annotations, &marker());

        assert_eq!(regions.len(), 2);
        assert_eq!((regions[0].start_time, regions[0].end_time), (10.0, 30.0));
        assert_eq!((regions[1].start_time, regions[1].end_time), (95.0, 100.0));
        assert_eq!(mask.len() - mask.valid_count(), 25);
        assert!(mask.is_valid(50));
    }

    #[test]
    fn test_heartbeat_gaps() {
        let pulses = [0.0, 1.0, 2.0, 20.0, 21.0, 28.0];
        let gaps = ArtifactProcessor::get_heartbeat_gaps(&pulses, 5.0, 10.0).unwrap();
        assert_eq!(gaps, vec![ArtifactRegion::new(7.0, 20.0, ArtifactKind::HeartbeatGap)]);

        // 21 -> 28 exceeds max_gap but the trimmed region is only 2 s
        let gaps = ArtifactProcessor::get_heartbeat_gaps(&pulses, 5.0, 1.0).unwrap();
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[1].start_time, 26.0);
    }

    #[test]
    fn test_unsorted_pulses_rejected() {
        let err = ArtifactProcessor::get_heartbeat_gaps(&[0.0, 5.0, 3.0], 5.0, 1.0).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsortedEvents(_)));
    }

    #[test]
    fn test_scan_combines_sources() {
        let mut annotations: Vec<AnnotationEvent> = (0..=10)
            .map(|t| AnnotationEvent::new(t as f64, 0.0, "pointIlluminationSensorValue"))
            .collect();
        annotations.push(AnnotationEvent::new(40.0, 0.0, "pointIlluminationSensorValue"));
        annotations.push(AnnotationEvent::new(30.0, 20.0, "blockArtefact"));

        let processor = ArtifactProcessor::new(&ArtifactConfig::default());
        let scan = processor.scan(60, 1.0, &annotations).unwrap();

        // gap [15, 40) overlaps annotated [30, 50)
        assert_eq!(scan.regions.len(), 1);
        assert_eq!(scan.regions[0].start_time, 15.0);
        assert_eq!(scan.regions[0].end_time, 50.0);
        assert_eq!(scan.regions[0].kind, ArtifactKind::Annotated);
        assert_eq!(scan.mask.len() - scan.mask.valid_count(), 35);

        let summary = processor.summary(&scan);
        assert_eq!(summary.count, 1);
        assert!((summary.duration_minutes - 35.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_scan_without_gap_detection() {
        let config = ArtifactConfig {
            detect_heartbeat_gaps: false,
            ..ArtifactConfig::default()
        };
        let annotations = vec![
            AnnotationEvent::new(0.0, 0.0, "pointIlluminationSensorValue"),
            AnnotationEvent::new(50.0, 0.0, "pointIlluminationSensorValue"),
        ];
        let scan = ArtifactProcessor::new(&config)
            .scan(60, 1.0, &annotations)
            .unwrap();
        assert!(scan.regions.is_empty());
        assert_eq!(scan.mask.valid_count(), 60);
    }
}

//! Respiratory event indices and sleep fragmentation

use crate::config::IndexDenominator;
use crate::labels::{EventCategory, LabelTable};
use crate::types::{
    AnnotationEvent, ArtifactRegion, Fragmentation, RespiratoryEventCounts, RespiratoryEventIndex,
    SleepStageArchitecture,
};

/// Events per hour, undefined when there is no sleep to normalize by
pub fn per_hour(count: u32, hours: f64) -> Option<f64> {
    (hours.is_finite() && hours > 0.0).then(|| count as f64 / hours)
}

pub fn calculate_respiratory_events(
    annotations: &[AnnotationEvent],
    table: &LabelTable<EventCategory>,
) -> RespiratoryEventCounts {
    let mut counts = RespiratoryEventCounts::default();
    for annotation in annotations {
        let Some(category) = table.classify(&annotation.label) else {
            continue;
        };
        let slot = match category {
            EventCategory::ObstructiveApnea => &mut counts.obstructive_apneas,
            EventCategory::CentralApnea => &mut counts.central_apneas,
            EventCategory::MixedApnea => &mut counts.mixed_apneas,
            EventCategory::ObstructiveHypopnea => &mut counts.obstructive_hypopneas,
            EventCategory::CentralHypopnea => &mut counts.central_hypopneas,
            EventCategory::MixedHypopnea => &mut counts.mixed_hypopneas,
            EventCategory::Desaturation => &mut counts.desaturations,
            EventCategory::Snore => &mut counts.snores,
            EventCategory::CheyneStokes => &mut counts.cheyne_stokes,
            _ => continue,
        };
        *slot += 1;
    }
    counts
}

pub fn calculate_indices(counts: RespiratoryEventCounts, sleep_hours: f64) -> RespiratoryEventIndex {
    let apneas = counts.apneas();
    let hypopneas = counts.hypopneas();

    RespiratoryEventIndex {
        total_apneas: apneas,
        total_hypopneas: hypopneas,
        ahi: per_hour(apneas + hypopneas, sleep_hours),
        ahi_obstructive: per_hour(
            counts.obstructive_apneas + counts.obstructive_hypopneas,
            sleep_hours,
        ),
        ahi_central: per_hour(counts.central_apneas + counts.central_hypopneas, sleep_hours),
        ahi_mixed: per_hour(counts.mixed_apneas + counts.mixed_hypopneas, sleep_hours),
        apnea_index: per_hour(apneas, sleep_hours),
        hypopnea_index: per_hour(hypopneas, sleep_hours),
        odi: per_hour(counts.desaturations, sleep_hours),
        snore_index: per_hour(counts.snores, sleep_hours),
        sleep_hours,
        counts,
    }
}

/// Hours used as the per-hour denominator under `policy`.
///
/// `ExcludeArtifacts` removes artifact time that overlaps sleep epochs; short
/// regions (below `min_reportable_duration`) count only when
/// `include_short_regions` is set.
pub fn index_hours(
    architecture: &SleepStageArchitecture,
    regions: &[ArtifactRegion],
    policy: IndexDenominator,
    min_reportable_duration: f64,
) -> f64 {
    let tst_hours = architecture.sleep_hours();
    let IndexDenominator::ExcludeArtifacts {
        include_short_regions,
    } = policy
    else {
        return tst_hours;
    };

    let epoch = architecture.hypnogram.epoch_duration;
    let excluded: f64 = regions
        .iter()
        .filter(|r| include_short_regions || r.duration >= min_reportable_duration)
        .map(|r| {
            architecture
                .hypnogram
                .epochs
                .iter()
                .filter(|e| e.stage.is_sleep())
                .map(|e| r.overlap(e.onset, e.onset + epoch))
                .sum::<f64>()
        })
        .sum();

    (tst_hours - excluded / 3600.0).max(0.0)
}

pub fn calculate_fragmentation(
    annotations: &[AnnotationEvent],
    table: &LabelTable<EventCategory>,
    sleep_hours: f64,
) -> Fragmentation {
    let arousals = table.count(annotations, EventCategory::Arousal);
    let limb_movements = table.count(annotations, EventCategory::LimbMovement);
    let periodic_limb_movements = table.count(annotations, EventCategory::PeriodicLimbMovement);

    Fragmentation {
        arousals,
        limb_movements,
        periodic_limb_movements,
        bruxism_events: table.count(annotations, EventCategory::Bruxism),
        arousal_index: per_hour(arousals, sleep_hours),
        plmi: per_hour(periodic_limb_movements, sleep_hours),
        fragmentation_index: per_hour(
            arousals + limb_movements + periodic_limb_movements,
            sleep_hours,
        ),
    }
}

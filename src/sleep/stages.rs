//! Hypnogram scoring and sleep stage architecture

use crate::config::{QualityConfig, SleepConfig};
use crate::labels::LabelTable;
use crate::types::{
    AnnotationEvent, Hypnogram, RemQuality, ScoredEpoch, SleepEfficiency, SleepStage,
    SleepStageArchitecture, StageSummary,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Lights-off to lights-on span (seconds from recording start)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedWindow {
    pub lights_off: f64,
    pub lights_on: f64,
}

impl BedWindow {
    pub fn minutes(&self) -> f64 {
        (self.lights_on - self.lights_off).max(0.0) / 60.0
    }
}

/// Score fixed-length epochs from stage annotations.
///
/// An interval annotation lasting `k` epochs (within `tolerance` seconds)
/// contributes `k` epochs. A point annotation extends to the next stage
/// annotation, or one epoch if it is the last. Spans that are not a whole
/// number of epochs are skipped.
pub fn calculate_stages(
    annotations: &[AnnotationEvent],
    table: &LabelTable<SleepStage>,
    epoch_duration: f64,
    tolerance: f64,
) -> Hypnogram {
    let mut staged: Vec<(f64, f64, SleepStage)> = annotations
        .iter()
        .filter_map(|a| table.classify(&a.label).map(|s| (a.onset, a.duration, s)))
        .collect();
    staged.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut epochs: Vec<ScoredEpoch> = Vec::new();
    for (i, &(onset, duration, stage)) in staged.iter().enumerate() {
        let span = if duration > tolerance {
            duration
        } else {
            staged
                .get(i + 1)
                .map(|next| next.0 - onset)
                .unwrap_or(epoch_duration)
        };

        let count = (span / epoch_duration).round();
        if count < 1.0 || (span - count * epoch_duration).abs() > tolerance {
            debug!(onset, span, ?stage, "partial epoch skipped");
            continue;
        }

        for k in 0..count as usize {
            let epoch_onset = onset + k as f64 * epoch_duration;
            let overlaps = epochs
                .last()
                .is_some_and(|last| epoch_onset < last.onset + epoch_duration - tolerance);
            if overlaps {
                debug!(onset = epoch_onset, "overlapping epoch skipped");
                continue;
            }
            epochs.push(ScoredEpoch {
                onset: epoch_onset,
                stage,
            });
        }
    }

    Hypnogram {
        epoch_duration,
        epochs,
    }
}

/// Bed window from lights annotations, defaulting to the recording start and
/// the end of the last scored epoch
pub fn bed_window(
    annotations: &[AnnotationEvent],
    hypnogram: &Hypnogram,
    config: &SleepConfig,
) -> BedWindow {
    let lights_off = annotations
        .iter()
        .find(|a| config.lights_off.matches(&a.label))
        .map(|a| a.onset)
        .unwrap_or(0.0);

    let lights_on = annotations
        .iter()
        .find(|a| config.lights_on.matches(&a.label) && a.onset >= lights_off)
        .map(|a| a.onset)
        .or_else(|| {
            hypnogram
                .epochs
                .last()
                .map(|e| e.onset + hypnogram.epoch_duration)
        })
        .unwrap_or(lights_off);

    BedWindow {
        lights_off,
        lights_on,
    }
}

/// Total sleep time, time in bed, efficiency, latency and WASO
pub fn calculate_efficiency(hypnogram: &Hypnogram, window: &BedWindow) -> SleepEfficiency {
    let epoch_minutes = hypnogram.epoch_minutes();
    let sleep_epochs = hypnogram.epochs.iter().filter(|e| e.stage.is_sleep()).count();
    let total_sleep_time = sleep_epochs as f64 * epoch_minutes;
    let time_in_bed = window.minutes();

    let sleep_efficiency =
        (time_in_bed > 0.0).then(|| (total_sleep_time / time_in_bed * 100.0).clamp(0.0, 100.0));

    let first = hypnogram.epochs.iter().position(|e| e.stage.is_sleep());
    let last = hypnogram.epochs.iter().rposition(|e| e.stage.is_sleep());

    let sleep_latency =
        first.map(|i| (hypnogram.epochs[i].onset - window.lights_off).max(0.0) / 60.0);

    let waso = match (first, last) {
        (Some(first), Some(last)) => {
            hypnogram.epochs[first..=last]
                .iter()
                .filter(|e| e.stage == SleepStage::Wake)
                .count() as f64
                * epoch_minutes
        }
        _ => 0.0,
    };

    SleepEfficiency {
        total_sleep_time,
        time_in_bed,
        sleep_efficiency,
        sleep_latency,
        waso,
    }
}

/// Number of maximal runs of consecutive REM epochs
pub fn rem_cycles(hypnogram: &Hypnogram) -> u32 {
    let mut cycles = 0;
    let mut in_rem = false;
    for epoch in &hypnogram.epochs {
        let rem = epoch.stage == SleepStage::Rem;
        if rem && !in_rem {
            cycles += 1;
        }
        in_rem = rem;
    }
    cycles
}

/// REM sub-score from REM minutes and REM event density
pub fn rem_quality(rem_minutes: f64, rem_events: u32, config: &QualityConfig) -> Option<RemQuality> {
    if rem_minutes <= 0.0 {
        return None;
    }
    let rem_density = rem_events as f64 / rem_minutes;
    let score = (config.rem_time_tiers.evaluate(rem_minutes)
        + config.rem_density_tiers.evaluate(rem_density))
    .clamp(0.0, 100.0);

    Some(RemQuality {
        score,
        rem_minutes,
        rem_events,
        rem_density,
    })
}

/// Per-stage summaries plus efficiency, REM latency, cycles and quality
pub fn calculate_architecture(
    hypnogram: Hypnogram,
    efficiency: &SleepEfficiency,
    rem_events: u32,
    config: &QualityConfig,
) -> SleepStageArchitecture {
    let epoch_minutes = hypnogram.epoch_minutes();
    let share = |minutes: f64, base: f64| (base > 0.0).then(|| minutes / base * 100.0);

    let stages: BTreeMap<SleepStage, StageSummary> = SleepStage::ALL
        .iter()
        .map(|&stage| {
            let epochs = hypnogram.count(stage);
            let minutes = epochs as f64 * epoch_minutes;
            let percentage = if stage.is_sleep() {
                share(minutes, efficiency.total_sleep_time)
            } else {
                share(minutes, efficiency.time_in_bed)
            };
            (
                stage,
                StageSummary {
                    epochs,
                    minutes,
                    percentage,
                },
            )
        })
        .collect();

    let onset = hypnogram.epochs.iter().find(|e| e.stage.is_sleep());
    let first_rem = hypnogram.epochs.iter().find(|e| e.stage == SleepStage::Rem);
    let rem_latency = match (onset, first_rem) {
        (Some(onset), Some(rem)) => Some((rem.onset - onset.onset) / 60.0),
        _ => None,
    };

    let rem_minutes = stages
        .get(&SleepStage::Rem)
        .map(|s| s.minutes)
        .unwrap_or(0.0);

    SleepStageArchitecture {
        total_sleep_time: efficiency.total_sleep_time,
        time_in_bed: efficiency.time_in_bed,
        sleep_efficiency: efficiency.sleep_efficiency,
        sleep_latency: efficiency.sleep_latency,
        waso: efficiency.waso,
        rem_latency,
        rem_cycles: rem_cycles(&hypnogram),
        rem_quality: rem_quality(rem_minutes, rem_events, config),
        stages,
        hypnogram,
    }
}

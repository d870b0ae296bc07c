//! Annotation label lookup tables
//!
//! Annotation vocabularies differ between scoring systems, so every label is
//! classified through an ordered list of `(match rule, category)` pairs. The
//! first matching rule wins; labels no rule matches are ignored by callers.

use crate::types::{AnnotationEvent, SleepStage};
use serde::{Deserialize, Serialize};

/// How a rule pattern is compared against an annotation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Label must equal the pattern exactly
    Exact,
    /// Label must contain the pattern, ignoring case
    #[default]
    Contains,
}

/// A single label pattern without a category, used for marker annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub pattern: String,
    #[serde(default)]
    pub rule: MatchRule,
}

impl Marker {
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rule: MatchRule::Contains,
        }
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rule: MatchRule::Exact,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        matches_rule(self.rule, &self.pattern, label)
    }
}

/// A label pattern mapped to a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule<T> {
    pub pattern: String,
    #[serde(default)]
    pub rule: MatchRule,
    pub category: T,
}

impl<T> LabelRule<T> {
    pub fn contains(pattern: impl Into<String>, category: T) -> Self {
        Self {
            pattern: pattern.into(),
            rule: MatchRule::Contains,
            category,
        }
    }

    pub fn exact(pattern: impl Into<String>, category: T) -> Self {
        Self {
            pattern: pattern.into(),
            rule: MatchRule::Exact,
            category,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        matches_rule(self.rule, &self.pattern, label)
    }
}

/// Ordered label → category table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable<T> {
    rules: Vec<LabelRule<T>>,
}

impl<T: Copy + PartialEq> LabelTable<T> {
    pub fn new(rules: Vec<LabelRule<T>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[LabelRule<T>] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category of the first rule matching `label`
    pub fn classify(&self, label: &str) -> Option<T> {
        self.rules
            .iter()
            .find(|rule| rule.matches(label))
            .map(|rule| rule.category)
    }

    /// Number of annotations classified as `category`
    pub fn count(&self, annotations: &[AnnotationEvent], category: T) -> u32 {
        annotations
            .iter()
            .filter(|a| self.classify(&a.label) == Some(category))
            .count() as u32
    }
}

fn matches_rule(rule: MatchRule, pattern: &str, label: &str) -> bool {
    match rule {
        MatchRule::Exact => label == pattern,
        MatchRule::Contains => label.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

/// Point and interval event categories scored on a PSG recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    ObstructiveApnea,
    CentralApnea,
    MixedApnea,
    ObstructiveHypopnea,
    CentralHypopnea,
    MixedHypopnea,
    Desaturation,
    Snore,
    CheyneStokes,
    Arousal,
    LimbMovement,
    PeriodicLimbMovement,
    Bruxism,
    RemEvent,
    Tachycardia,
    Bradycardia,
}

/// Stage table covering EDF+ "Sleep stage" labels in R&K and AASM notation
pub fn default_stage_table() -> LabelTable<SleepStage> {
    LabelTable::new(vec![
        LabelRule::contains("Sleep stage W", SleepStage::Wake),
        LabelRule::contains("Sleep stage N1", SleepStage::N1),
        LabelRule::contains("Sleep stage N2", SleepStage::N2),
        LabelRule::contains("Sleep stage N3", SleepStage::N3),
        LabelRule::contains("Sleep stage 1", SleepStage::N1),
        LabelRule::contains("Sleep stage 2", SleepStage::N2),
        LabelRule::contains("Sleep stage 3", SleepStage::N3),
        LabelRule::contains("Sleep stage 4", SleepStage::N3),
        LabelRule::contains("Sleep stage R", SleepStage::Rem),
        LabelRule::contains("Sleep stage ?", SleepStage::Unknown),
        LabelRule::contains("Sleep stage Unknown", SleepStage::Unknown),
    ])
}

/// Event table covering the point-event markup tags and plain English labels
pub fn default_event_table() -> LabelTable<EventCategory> {
    use EventCategory::*;

    LabelTable::new(vec![
        // Markup tags emitted by the acquisition software
        LabelRule::contains("pointPolySomnographyObstructiveApnea", ObstructiveApnea),
        LabelRule::contains("pointPolySomnographyCentralApnea", CentralApnea),
        LabelRule::contains("pointPolySomnographyMixedApnea", MixedApnea),
        LabelRule::contains("pointPolySomnographyCentralHypopnea", CentralHypopnea),
        LabelRule::contains("pointPolySomnographyMixedHypopnea", MixedHypopnea),
        LabelRule::contains("pointPolySomnographyHypopnea", ObstructiveHypopnea),
        LabelRule::contains("pointPolySomnographyDesaturation", Desaturation),
        LabelRule::contains("pointPolySomnographySnore", Snore),
        LabelRule::contains("pointPolySomnographyCheyneStokesRespiration", CheyneStokes),
        LabelRule::contains("pointPolySomnographyActivation", Arousal),
        LabelRule::contains(
            "pointPolySomnographyPeriodicalLegsMovements",
            PeriodicLimbMovement,
        ),
        LabelRule::contains("pointPolySomnographyLegsMovements", LimbMovement),
        LabelRule::contains("pointBruxism", Bruxism),
        LabelRule::contains("pointPolySomnographyREM", RemEvent),
        LabelRule::contains("Тахикардия", Tachycardia),
        LabelRule::contains("Брадикардия", Bradycardia),
        // Plain labels
        LabelRule::contains("Obstructive Apnea", ObstructiveApnea),
        LabelRule::contains("Central Apnea", CentralApnea),
        LabelRule::contains("Mixed Apnea", MixedApnea),
        LabelRule::contains("Central Hypopnea", CentralHypopnea),
        LabelRule::contains("Mixed Hypopnea", MixedHypopnea),
        LabelRule::contains("Hypopnea", ObstructiveHypopnea),
        LabelRule::contains("Desaturation", Desaturation),
        LabelRule::contains("Snore", Snore),
        LabelRule::contains("Cheyne", CheyneStokes),
        LabelRule::contains("Arousal", Arousal),
        LabelRule::contains("Periodic Limb Movement", PeriodicLimbMovement),
        LabelRule::contains("Limb Movement", LimbMovement),
        LabelRule::contains("Bruxism", Bruxism),
        LabelRule::contains("Rapid Eye Movement", RemEvent),
        LabelRule::contains("Tachycardia", Tachycardia),
        LabelRule::contains("Bradycardia", Bradycardia),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_case_insensitive() {
        let marker = Marker::contains("blockArtefact");
        assert!(marker.matches("Артефакт(blockArtefact)"));
        assert!(marker.matches("BLOCKARTEFACT"));
        assert!(!marker.matches("artefact"));
    }

    #[test]
    fn test_exact_requires_equality() {
        let marker = Marker::exact("pointIlluminationSensorValue");
        assert!(marker.matches("pointIlluminationSensorValue"));
        assert!(!marker.matches("pointIlluminationSensorValue "));
    }

    #[test]
    fn test_stage_table_maps_edf_labels() {
        let table = default_stage_table();
        assert_eq!(table.classify("Sleep stage W"), Some(SleepStage::Wake));
        assert_eq!(
            table.classify("Sleep stage R(eventUnknown)"),
            Some(SleepStage::Rem)
        );
        assert_eq!(table.classify("Sleep stage 4"), Some(SleepStage::N3));
        assert_eq!(table.classify("Sleep stage N2"), Some(SleepStage::N2));
        assert_eq!(
            table.classify("Sleep stage Unknown(eventUnknown)"),
            Some(SleepStage::Unknown)
        );
        assert_eq!(table.classify("Lights off"), None);
    }

    #[test]
    fn test_event_table_prefers_specific_hypopnea() {
        let table = default_event_table();
        assert_eq!(
            table.classify("Центральное гипопноэ(pointPolySomnographyCentralHypopnea)"),
            Some(EventCategory::CentralHypopnea)
        );
        assert_eq!(
            table.classify("Обструктивное гипопноэ(pointPolySomnographyHypopnea)"),
            Some(EventCategory::ObstructiveHypopnea)
        );
        assert_eq!(
            table.classify("Periodic Limb Movement"),
            Some(EventCategory::PeriodicLimbMovement)
        );
        assert_eq!(table.classify("Hypopnea"), Some(EventCategory::ObstructiveHypopnea));
        assert_eq!(table.classify("Тахикардия"), Some(EventCategory::Tachycardia));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let table = LabelTable::new(vec![
            LabelRule::contains("apnea", 1u8),
            LabelRule::contains("central apnea", 2u8),
        ]);
        assert_eq!(table.classify("Central Apnea"), Some(1));
    }

    #[test]
    fn test_count() {
        let table = default_event_table();
        let annotations = vec![
            AnnotationEvent::new(10.0, 12.0, "Obstructive Apnea"),
            AnnotationEvent::new(50.0, 15.0, "Obstructive Apnea"),
            AnnotationEvent::new(70.0, 0.0, "Snore"),
        ];
        assert_eq!(table.count(&annotations, EventCategory::ObstructiveApnea), 2);
        assert_eq!(table.count(&annotations, EventCategory::Snore), 1);
        assert_eq!(table.count(&annotations, EventCategory::CentralApnea), 0);
    }

    #[test]
    fn test_table_deserializes_with_default_rule() {
        let json = r#"[{"pattern": "apnea", "category": "central_apnea"}]"#;
        let table: LabelTable<EventCategory> = serde_json::from_str(json).unwrap();
        assert_eq!(table.rules()[0].rule, MatchRule::Contains);
        assert_eq!(table.classify("APNEA"), Some(EventCategory::CentralApnea));
    }
}

//! Tiered threshold rules
//!
//! Every scoring factor is an ordered list of `(threshold, points)` rules
//! sharing one comparison. [`Tiers::evaluate`] returns the points of the first
//! rule the value satisfies, so tiers are mutually exclusive.

use serde::{Deserialize, Serialize};

/// Comparison applied between the value and each rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// value >= threshold
    AtLeast,
    /// value > threshold
    Above,
    /// value < threshold
    Below,
}

impl Comparison {
    fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::AtLeast => value >= threshold,
            Comparison::Above => value > threshold,
            Comparison::Below => value < threshold,
        }
    }
}

/// One `(threshold, points)` rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: f64,
    pub points: f64,
}

/// Ordered rule list evaluated first-match-wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tiers {
    pub comparison: Comparison,
    pub rules: Vec<Tier>,
}

impl Tiers {
    pub fn new(comparison: Comparison, rules: &[(f64, f64)]) -> Self {
        Self {
            comparison,
            rules: rules
                .iter()
                .map(|&(threshold, points)| Tier { threshold, points })
                .collect(),
        }
    }

    pub fn at_least(rules: &[(f64, f64)]) -> Self {
        Self::new(Comparison::AtLeast, rules)
    }

    pub fn above(rules: &[(f64, f64)]) -> Self {
        Self::new(Comparison::Above, rules)
    }

    pub fn below(rules: &[(f64, f64)]) -> Self {
        Self::new(Comparison::Below, rules)
    }

    /// Points of the first satisfied rule, 0 when none matches
    pub fn evaluate(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        self.rules
            .iter()
            .find(|tier| self.comparison.holds(value, tier.threshold))
            .map(|tier| tier.points)
            .unwrap_or(0.0)
    }

    /// Missing inputs contribute nothing
    pub fn evaluate_opt(&self, value: Option<f64>) -> f64 {
        value.map(|v| self.evaluate(v)).unwrap_or(0.0)
    }

    /// Check that thresholds are ordered so that earlier rules are stricter.
    ///
    /// For `AtLeast`/`Above` thresholds must descend, for `Below` they must
    /// ascend; otherwise a later tier could never match.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        for tier in &self.rules {
            if !tier.threshold.is_finite() || !tier.points.is_finite() {
                return Err(format!("{name}: thresholds and points must be finite"));
            }
        }
        let ordered = self.rules.windows(2).all(|pair| match self.comparison {
            Comparison::AtLeast | Comparison::Above => pair[0].threshold > pair[1].threshold,
            Comparison::Below => pair[0].threshold < pair[1].threshold,
        });
        if !ordered {
            return Err(format!(
                "{name}: tier thresholds must be strictly {} for {:?}",
                match self.comparison {
                    Comparison::Below => "ascending",
                    _ => "descending",
                },
                self.comparison
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_least_first_match() {
        let tiers = Tiers::at_least(&[(85.0, 25.0), (70.0, 20.0), (50.0, 10.0)]);
        assert_eq!(tiers.evaluate(85.39), 25.0);
        assert_eq!(tiers.evaluate(85.0), 25.0);
        assert_eq!(tiers.evaluate(72.0), 20.0);
        assert_eq!(tiers.evaluate(50.0), 10.0);
        assert_eq!(tiers.evaluate(49.9), 0.0);
    }

    #[test]
    fn test_below_first_match() {
        let tiers = Tiers::below(&[(5.0, 30.0), (15.0, 20.0), (30.0, 10.0)]);
        assert_eq!(tiers.evaluate(0.0), 30.0);
        assert_eq!(tiers.evaluate(13.83), 20.0);
        assert_eq!(tiers.evaluate(15.0), 10.0);
        assert_eq!(tiers.evaluate(30.0), 0.0);
    }

    #[test]
    fn test_above_penalty() {
        let tiers = Tiers::above(&[(10.0, -15.0), (5.0, -10.0), (0.0, -5.0)]);
        assert_eq!(tiers.evaluate(0.0), 0.0);
        assert_eq!(tiers.evaluate(1.0), -5.0);
        assert_eq!(tiers.evaluate(6.0), -10.0);
        assert_eq!(tiers.evaluate(11.0), -15.0);
    }

    #[test]
    fn test_missing_and_non_finite_contribute_nothing() {
        let tiers = Tiers::below(&[(5.0, 30.0)]);
        assert_eq!(tiers.evaluate_opt(None), 0.0);
        assert_eq!(tiers.evaluate(f64::NAN), 0.0);
    }

    #[test]
    fn test_validate_ordering() {
        assert!(Tiers::at_least(&[(85.0, 25.0), (70.0, 20.0)]).validate("eff").is_ok());
        assert!(Tiers::at_least(&[(70.0, 20.0), (85.0, 25.0)]).validate("eff").is_err());
        assert!(Tiers::below(&[(5.0, 30.0), (15.0, 20.0)]).validate("ahi").is_ok());
        assert!(Tiers::below(&[(15.0, 20.0), (5.0, 30.0)]).validate("ahi").is_err());
    }
}

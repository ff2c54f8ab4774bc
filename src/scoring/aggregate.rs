//! Weighted aggregation of the four criteria and risk classification

use crate::model::config::{RiskLevelCutoffs, Weights};
use crate::model::GlobalRiskLevel;

/// Neutral score used when the financial score is absent and the internal
/// weights sum to zero.
const NEUTRAL_SCORE: f64 = 50.0;

/// Combine the three internal scores and an optional financial score into
/// the global score in [0, 100].
///
/// When the financial score is absent (the assessment was indeterminate),
/// its weight is redistributed proportionally across the internal weights
/// and the result is renormalized by the sum of all four original weights.
pub fn aggregate_global_score(
    c1: i32,
    c2: i32,
    c3: i32,
    financial: Option<i32>,
    weights: &Weights,
) -> i32 {
    let w1 = weights.c1_delivery;
    let w2 = weights.c2_dependency;
    let w3 = weights.c3_relationship;
    let w4 = weights.c4_financial;

    let total = match financial {
        Some(fin) => {
            f64::from(c1) * w1 + f64::from(c2) * w2 + f64::from(c3) * w3 + f64::from(fin) * w4
        }
        None => {
            let internal_total = w1 + w2 + w3;
            if internal_total > 0.0 {
                let redistributed = f64::from(c1) * (w1 / internal_total)
                    + f64::from(c2) * (w2 / internal_total)
                    + f64::from(c3) * (w3 / internal_total);
                redistributed * (w1 + w2 + w3 + w4)
            } else {
                NEUTRAL_SCORE
            }
        }
    };

    total.round().clamp(0.0, 100.0) as i32
}

/// Map a global score to its risk level using the configured cutoffs.
pub fn classify_risk(global_score: i32, cutoffs: &RiskLevelCutoffs) -> GlobalRiskLevel {
    if global_score >= cutoffs.high {
        GlobalRiskLevel::High
    } else if global_score >= cutoffs.medium {
        GlobalRiskLevel::Medium
    } else {
        GlobalRiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_yield_the_same_global_score() {
        // Default weights sum to 1.0, so equal component scores pass
        // through unchanged.
        let weights = Weights::default();
        for x in [0, 25, 50, 77, 100] {
            assert_eq!(aggregate_global_score(x, x, x, Some(x), &weights), x);
        }
    }

    #[test]
    fn absent_financial_redistribution_preserves_fifty() {
        // Redistribution invariant: C1=C2=C3=50 must aggregate to 50
        // regardless of how the internal weights are split.
        let splits = [
            (0.20, 0.15, 0.15),
            (0.45, 0.04, 0.01),
            (0.10, 0.10, 0.30),
        ];
        for (w1, w2, w3) in splits {
            let weights = Weights {
                c1_delivery: w1,
                c2_dependency: w2,
                c3_relationship: w3,
                c4_financial: 1.0 - w1 - w2 - w3,
            };
            assert_eq!(aggregate_global_score(50, 50, 50, None, &weights), 50);
        }
    }

    #[test]
    fn zero_internal_weights_fall_back_to_neutral() {
        let weights = Weights {
            c1_delivery: 0.0,
            c2_dependency: 0.0,
            c3_relationship: 0.0,
            c4_financial: 1.0,
        };
        assert_eq!(aggregate_global_score(90, 10, 70, None, &weights), 50);
    }

    #[test]
    fn weighted_combination_matches_hand_computation() {
        let weights = Weights::default();
        // 0.20*80 + 0.15*40 + 0.15*20 + 0.50*90 = 70
        assert_eq!(aggregate_global_score(80, 40, 20, Some(90), &weights), 70);
    }

    #[test]
    fn absent_financial_renormalizes_internal_scores() {
        let weights = Weights::default();
        // Internal weights 0.20/0.15/0.15 over scores 80/40/20, scaled by
        // the full weight sum 1.0: (80*0.4 + 40*0.3 + 20*0.3) = 50.
        assert_eq!(aggregate_global_score(80, 40, 20, None, &weights), 50);
    }

    #[test]
    fn result_is_clamped_to_valid_range() {
        let weights = Weights {
            c1_delivery: 1.0,
            c2_dependency: 1.0,
            c3_relationship: 1.0,
            c4_financial: 1.0,
        };
        assert_eq!(aggregate_global_score(100, 100, 100, Some(100), &weights), 100);
    }

    #[test]
    fn classification_boundaries_are_exact() {
        let cutoffs = RiskLevelCutoffs::default();
        assert_eq!(classify_risk(70, &cutoffs), GlobalRiskLevel::High);
        assert_eq!(classify_risk(69, &cutoffs), GlobalRiskLevel::Medium);
        assert_eq!(classify_risk(55, &cutoffs), GlobalRiskLevel::Medium);
        assert_eq!(classify_risk(54, &cutoffs), GlobalRiskLevel::Low);
        assert_eq!(classify_risk(100, &cutoffs), GlobalRiskLevel::High);
        assert_eq!(classify_risk(0, &cutoffs), GlobalRiskLevel::Low);
    }

    #[test]
    fn custom_cutoffs_are_respected() {
        let cutoffs = RiskLevelCutoffs { high: 90, medium: 30 };
        assert_eq!(classify_risk(89, &cutoffs), GlobalRiskLevel::Medium);
        assert_eq!(classify_risk(29, &cutoffs), GlobalRiskLevel::Low);
    }
}

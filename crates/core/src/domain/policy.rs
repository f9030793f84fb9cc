use crate::domain::instruments::RiskScore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    LowMedium,
    Medium,
    MediumHigh,
    High,
}

impl RiskTier {
    pub const ALL: [RiskTier; 5] = [
        RiskTier::Low,
        RiskTier::LowMedium,
        RiskTier::Medium,
        RiskTier::MediumHigh,
        RiskTier::High,
    ];

    pub fn number(self) -> u8 {
        match self {
            RiskTier::Low => 1,
            RiskTier::LowMedium => 2,
            RiskTier::Medium => 3,
            RiskTier::MediumHigh => 4,
            RiskTier::High => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Low => "low risk",
            RiskTier::LowMedium => "low-medium risk",
            RiskTier::Medium => "medium risk",
            RiskTier::MediumHigh => "medium-high risk",
            RiskTier::High => "high risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundPolicy {
    pub tier: RiskTier,
    pub lower: f64,
    pub upper: f64,
    pub explanation: &'static str,
}

impl BoundPolicy {
    pub fn is_feasible_for(&self, n: usize) -> bool {
        let n = n as f64;
        n > 0.0 && self.lower * n <= 1.0 + FEASIBILITY_EPS && self.upper * n >= 1.0 - FEASIBILITY_EPS
    }

    pub fn bounds(&self, n: usize) -> Vec<(f64, f64)> {
        vec![(self.lower, self.upper); n]
    }
}

const LOWER_BOUND: f64 = 0.05;
const FEASIBILITY_EPS: f64 = 1e-12;

/// Scores on a boundary (20, 40, 60, 80) fall in the lower tier. Anything at or below 20,
/// negatives included, is tier 1 and anything above 80 is tier 5.
pub fn select_policy(score: RiskScore) -> BoundPolicy {
    let tier = match score.value() {
        s if s <= 20 => RiskTier::Low,
        s if s <= 40 => RiskTier::LowMedium,
        s if s <= 60 => RiskTier::Medium,
        s if s <= 80 => RiskTier::MediumHigh,
        _ => RiskTier::High,
    };
    policy_for_tier(tier)
}

pub fn policy_for_tier(tier: RiskTier) -> BoundPolicy {
    let (upper, explanation) = match tier {
        RiskTier::Low => (
            0.20,
            "Low-risk portfolio: each holding is limited to between 5% and 20% of the portfolio to reduce single-stock exposure.",
        ),
        RiskTier::LowMedium => (
            0.25,
            "Low-to-medium-risk portfolio: each holding is limited to between 5% and 25% of the portfolio, moderately reducing risk.",
        ),
        RiskTier::Medium => (
            0.30,
            "Medium-risk portfolio: each holding is limited to between 5% and 30% of the portfolio, balancing risk and return.",
        ),
        RiskTier::MediumHigh => (
            0.35,
            "Medium-to-high-risk portfolio: each holding is limited to between 5% and 35% of the portfolio, allowing more potential upside.",
        ),
        RiskTier::High => (
            0.50,
            "High-risk portfolio: each holding is limited to between 5% and 50% of the portfolio in pursuit of higher potential returns.",
        ),
    };

    BoundPolicy {
        tier,
        lower: LOWER_BOUND,
        upper,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier_of(score: i64) -> RiskTier {
        select_policy(RiskScore(score)).tier
    }

    #[test]
    fn boundary_scores_belong_to_lower_tier() {
        assert_eq!(tier_of(0), RiskTier::Low);
        assert_eq!(tier_of(20), RiskTier::Low);
        assert_eq!(tier_of(21), RiskTier::LowMedium);
        assert_eq!(tier_of(40), RiskTier::LowMedium);
        assert_eq!(tier_of(41), RiskTier::Medium);
        assert_eq!(tier_of(60), RiskTier::Medium);
        assert_eq!(tier_of(61), RiskTier::MediumHigh);
        assert_eq!(tier_of(80), RiskTier::MediumHigh);
        assert_eq!(tier_of(81), RiskTier::High);
        assert_eq!(tier_of(100), RiskTier::High);
    }

    #[test]
    fn out_of_range_scores_fall_through() {
        assert_eq!(tier_of(-5), RiskTier::Low);
        assert_eq!(tier_of(i64::MIN), RiskTier::Low);
        assert_eq!(tier_of(101), RiskTier::High);
        assert_eq!(tier_of(i64::MAX), RiskTier::High);
    }

    #[test]
    fn bounds_per_tier() {
        let expected = [0.20, 0.25, 0.30, 0.35, 0.50];
        for (tier, upper) in RiskTier::ALL.into_iter().zip(expected) {
            let p = policy_for_tier(tier);
            assert_eq!(p.lower, 0.05);
            assert_eq!(p.upper, upper);
            assert!(!p.explanation.is_empty());
        }
        let p = select_policy(RiskScore(20));
        assert_eq!((p.lower, p.upper), (0.05, 0.20));
        let p = select_policy(RiskScore(21));
        assert_eq!((p.lower, p.upper), (0.05, 0.25));
        let p = select_policy(RiskScore(100));
        assert_eq!((p.lower, p.upper), (0.05, 0.50));
    }

    #[test]
    fn feasibility_matches_bound_arithmetic() {
        let low = policy_for_tier(RiskTier::Low);
        assert!(!low.is_feasible_for(0));
        assert!(!low.is_feasible_for(1));
        assert!(!low.is_feasible_for(4));
        assert!(low.is_feasible_for(5));
        assert!(low.is_feasible_for(20));
        assert!(!low.is_feasible_for(21));

        let high = policy_for_tier(RiskTier::High);
        assert!(!high.is_feasible_for(1));
        assert!(high.is_feasible_for(2));
    }
}

use crate::domain::instruments::InstrumentSet;
use crate::domain::policy::{BoundPolicy, RiskTier};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Allocation {
    pub instruments: InstrumentSet,
    pub weights: Vec<f64>,
    pub policy: BoundPolicy,
    pub volatility: f64,
    pub expected_return: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightEntry {
    pub ticker: String,
    pub weight: f64,
    pub percent: String,
}

impl Allocation {
    pub fn explanation(&self) -> &'static str {
        self.policy.explanation
    }

    pub fn tier(&self) -> RiskTier {
        self.policy.tier
    }

    pub fn entries(&self) -> Vec<WeightEntry> {
        self.instruments
            .iter()
            .zip(&self.weights)
            .map(|(ticker, &weight)| WeightEntry {
                ticker: ticker.clone(),
                weight,
                percent: format_percent(weight),
            })
            .collect()
    }
}

pub fn format_percent(weight: f64) -> String {
    let pct = weight * 100.0;
    // Avoid rendering "-0.00" for tiny negative solver noise.
    let pct = if pct.abs() < 0.005 { 0.0 } else { pct };
    format!("{pct:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instruments::RiskScore;
    use crate::domain::policy::select_policy;

    #[test]
    fn format_percent_two_decimals() {
        assert_eq!(format_percent(0.2345), "23.45");
        assert_eq!(format_percent(1.0), "100.00");
        assert_eq!(format_percent(0.05), "5.00");
        assert_eq!(format_percent(-1e-9), "0.00");
    }

    #[test]
    fn entries_follow_instrument_order() {
        let allocation = Allocation {
            instruments: InstrumentSet::parse_csv("B,A,C").unwrap(),
            weights: vec![0.5, 0.3, 0.2],
            policy: select_policy(RiskScore(90)),
            volatility: 0.1,
            expected_return: 0.05,
            iterations: 3,
        };
        let entries = allocation.entries();
        let tickers: Vec<_> = entries.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, ["B", "A", "C"]);
        assert_eq!(entries[0].percent, "50.00");
        assert!((allocation.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(allocation.tier(), RiskTier::High);
    }
}

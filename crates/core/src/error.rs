use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("market data provider failed: {0:#}")]
    MarketData(anyhow::Error),

    #[error(
        "no feasible allocation: {n} instruments with weight bounds [{lower}, {upper}] cannot sum to 1"
    )]
    Infeasible { n: usize, lower: f64, upper: f64 },

    #[error("optimizer did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("failed to render chart: {0:#}")]
    Chart(anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::DataUnavailable(_) => "data_unavailable",
            EngineError::MarketData(_) => "market_data",
            EngineError::Infeasible { .. } => "infeasible",
            EngineError::NotConverged { .. } => "not_converged",
            EngineError::Chart(_) => "chart",
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infeasible_message_names_bounds() {
        let err = EngineError::Infeasible {
            n: 1,
            lower: 0.05,
            upper: 0.2,
        };
        assert_eq!(err.kind(), "infeasible");
        assert!(err.to_string().contains("[0.05, 0.2]"));
    }

    #[test]
    fn market_data_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("GET chart/AAPL failed");
        let err = EngineError::MarketData(inner);
        let text = err.to_string();
        assert!(text.contains("GET chart/AAPL failed"));
        assert!(text.contains("connection reset"));
    }
}

use crate::domain::instruments::InstrumentSet;
use crate::error::EngineError;
use crate::market::provider::MarketDataProvider;
use crate::market::returns::ReturnSeries;
use crate::time::window::DateRange;

// A sample covariance needs at least two observations.
pub const MIN_RETURN_ROWS: usize = 2;

pub async fn fetch_returns(
    provider: &dyn MarketDataProvider,
    instruments: &InstrumentSet,
    range: DateRange,
) -> Result<ReturnSeries, EngineError> {
    if instruments.is_empty() {
        return Err(EngineError::invalid_input("instrument list must be non-empty"));
    }
    let range = DateRange::try_new(range.start, range.end)?;

    let prices = provider
        .fetch_adjusted_closes(instruments, range)
        .await
        .map_err(EngineError::MarketData)?;

    let missing: Vec<&str> = instruments
        .iter()
        .filter(|ticker| {
            prices
                .iter()
                .find(|s| &s.ticker == *ticker)
                .map_or(true, |s| s.usable_len() == 0)
        })
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::DataUnavailable(format!(
            "no price data for {} between {} and {}",
            missing.join(", "),
            range.start,
            range.end
        )));
    }

    let returns = ReturnSeries::from_prices(instruments, &prices);
    tracing::info!(
        provider = provider.provider_name(),
        instruments = instruments.len(),
        rows = returns.len(),
        start = %range.start,
        end = %range.end,
        "derived daily returns"
    );

    if returns.len() < MIN_RETURN_ROWS {
        return Err(EngineError::DataUnavailable(format!(
            "only {} complete return rows between {} and {} (need at least {MIN_RETURN_ROWS})",
            returns.len(),
            range.start,
            range.end
        )));
    }

    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::memory::InMemoryProvider;
    use crate::market::types::{PricePoint, PriceSeries};
    use anyhow::Result;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn walk(ticker: &str, days: i64, step: f64) -> PriceSeries {
        PriceSeries {
            ticker: ticker.into(),
            points: (0..days)
                .map(|i| PricePoint {
                    date: start() + Duration::days(i),
                    adj_close: Some(100.0 + step * (i as f64) + if i % 2 == 0 { 0.5 } else { 0.0 }),
                })
                .collect(),
        }
    }

    fn range() -> DateRange {
        DateRange::try_new(start(), start() + Duration::days(60)).unwrap()
    }

    #[tokio::test]
    async fn derives_returns_for_known_instruments() {
        let provider = InMemoryProvider::new([walk("A", 30, 1.0), walk("B", 30, -0.5)]);
        let instruments = InstrumentSet::parse_csv("A,B").unwrap();
        let returns = fetch_returns(&provider, &instruments, range()).await.unwrap();
        assert_eq!(returns.len(), 29);
        assert_eq!(returns.values().ncols(), 2);
    }

    #[tokio::test]
    async fn unknown_instrument_is_data_unavailable() {
        let provider = InMemoryProvider::new([walk("A", 30, 1.0)]);
        let instruments = InstrumentSet::parse_csv("A,NOPE").unwrap();
        let err = fetch_returns(&provider, &instruments, range()).await.unwrap_err();
        match err {
            EngineError::DataUnavailable(msg) => assert!(msg.contains("NOPE")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_few_rows_is_data_unavailable() {
        let provider = InMemoryProvider::new([walk("A", 2, 1.0)]);
        let instruments = InstrumentSet::parse_csv("A").unwrap();
        let err = fetch_returns(&provider, &instruments, range()).await.unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }

    #[tokio::test]
    async fn inverted_range_is_invalid_input() {
        let provider = InMemoryProvider::default();
        let instruments = InstrumentSet::parse_csv("A").unwrap();
        let inverted = DateRange {
            start: start(),
            end: start() - Duration::days(1),
        };
        let err = fetch_returns(&provider, &instruments, inverted).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl MarketDataProvider for FailingProvider {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_adjusted_closes(
            &self,
            _instruments: &InstrumentSet,
            _range: DateRange,
        ) -> Result<Vec<PriceSeries>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn provider_failure_is_market_data_error() {
        let instruments = InstrumentSet::parse_csv("A").unwrap();
        let err = fetch_returns(&FailingProvider, &instruments, range())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "market_data");
    }
}

use crate::domain::instruments::InstrumentSet;
use crate::market::provider::MarketDataProvider;
use crate::market::types::PriceSeries;
use crate::time::window::DateRange;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryProvider {
    pub fn new(series: impl IntoIterator<Item = PriceSeries>) -> Self {
        Self {
            series: series
                .into_iter()
                .map(|s| (s.ticker.clone(), s))
                .collect(),
        }
    }

    /// Reads a JSON array of `{ "ticker": ..., "points": [{ "date", "adj_close" }] }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prices file {}", path.display()))?;
        let series: Vec<PriceSeries> = serde_json::from_str(&text)
            .with_context(|| format!("prices file {} is not a list of price series", path.display()))?;
        Ok(Self::new(series))
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for InMemoryProvider {
    fn provider_name(&self) -> &'static str {
        "in_memory"
    }

    async fn fetch_adjusted_closes(
        &self,
        instruments: &InstrumentSet,
        range: DateRange,
    ) -> Result<Vec<PriceSeries>> {
        Ok(instruments
            .iter()
            .map(|ticker| match self.series.get(ticker) {
                Some(series) => PriceSeries {
                    ticker: ticker.clone(),
                    points: series
                        .points
                        .iter()
                        .filter(|p| p.date >= range.start && p.date <= range.end)
                        .copied()
                        .collect(),
                },
                None => PriceSeries::empty(ticker.as_str()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::PricePoint;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    #[tokio::test]
    async fn filters_to_range_and_reports_unknown_as_empty() {
        let provider = InMemoryProvider::new([PriceSeries {
            ticker: "A".into(),
            points: (1..=10)
                .map(|day| PricePoint {
                    date: d(day),
                    adj_close: Some(day as f64),
                })
                .collect(),
        }]);
        let instruments = InstrumentSet::parse_csv("A,B").unwrap();
        let range = DateRange::try_new(d(3), d(5)).unwrap();

        let out = provider.fetch_adjusted_closes(&instruments, range).await.unwrap();
        assert_eq!(out[0].points.len(), 3);
        assert_eq!(out[0].points[0].date, d(3));
        assert_eq!(out[1].ticker, "B");
        assert!(out[1].points.is_empty());
    }

    #[test]
    fn loads_json_file() {
        let dir = std::env::temp_dir().join(format!("prices-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prices.json");
        std::fs::write(
            &path,
            r#"[{"ticker":"A","points":[{"date":"2026-02-01","adj_close":1.5},{"date":"2026-02-02","adj_close":null}]}]"#,
        )
        .unwrap();

        let provider = InMemoryProvider::from_json_file(&path).unwrap();
        assert_eq!(provider.series.len(), 1);
        assert_eq!(provider.series["A"].points.len(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

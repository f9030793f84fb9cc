use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub points: Vec<PricePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adj_close: Option<f64>,
}

impl PriceSeries {
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            points: Vec::new(),
        }
    }

    pub fn usable_len(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.adj_close.is_some_and(is_usable_price))
            .count()
    }
}

pub(crate) fn is_usable_price(p: f64) -> bool {
    p.is_finite() && p > 0.0
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResult {
    pub timestamp: Option<Vec<i64>>,
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
    #[serde(rename = "adjclose")]
    pub adj_close: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Quote {
    pub close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdjClose {
    #[serde(rename = "adjclose")]
    pub adj_close: Option<Vec<Option<f64>>>,
}

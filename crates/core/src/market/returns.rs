use crate::domain::instruments::InstrumentSet;
use crate::market::types::{is_usable_price, PriceSeries};
use anyhow::ensure;
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use std::collections::{BTreeMap, BTreeSet};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct ReturnSeries {
    instruments: InstrumentSet,
    dates: Vec<NaiveDate>,
    values: Array2<f64>,
}

impl ReturnSeries {
    /// Builds day-over-day returns on the union of observed dates, then drops every row in
    /// which any instrument lacks a price on that day or the previous one.
    pub fn from_prices(instruments: &InstrumentSet, prices: &[PriceSeries]) -> Self {
        let by_ticker: Vec<BTreeMap<NaiveDate, f64>> = instruments
            .iter()
            .map(|ticker| {
                prices
                    .iter()
                    .find(|s| &s.ticker == ticker)
                    .map(|s| {
                        s.points
                            .iter()
                            .filter_map(|p| {
                                p.adj_close
                                    .filter(|&v| is_usable_price(v))
                                    .map(|v| (p.date, v))
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let all_dates: Vec<NaiveDate> = by_ticker
            .iter()
            .flat_map(|m| m.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut dates = Vec::new();
        let mut flat = Vec::new();
        for pair in all_dates.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            let row: Option<Vec<f64>> = by_ticker
                .iter()
                .map(|m| match (m.get(&prev), m.get(&cur)) {
                    (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
                    _ => None,
                })
                .collect();
            if let Some(row) = row {
                dates.push(cur);
                flat.extend(row);
            }
        }

        let values = Array2::from_shape_vec((dates.len(), instruments.len()), flat)
            .unwrap_or_else(|_| Array2::zeros((0, instruments.len())));

        Self {
            instruments: instruments.clone(),
            dates,
            values,
        }
    }

    pub fn from_rows(
        instruments: &InstrumentSet,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> anyhow::Result<Self> {
        ensure!(
            dates.len() == rows.len(),
            "{} dates for {} rows",
            dates.len(),
            rows.len()
        );
        let n = instruments.len();
        let mut flat = Vec::with_capacity(rows.len() * n);
        for (i, row) in rows.into_iter().enumerate() {
            ensure!(row.len() == n, "row {i} has {} values, expected {n}", row.len());
            ensure!(row.iter().all(|v| v.is_finite()), "row {i} has a non-finite value");
            flat.extend(row);
        }
        let values = Array2::from_shape_vec((dates.len(), n), flat)?;
        Ok(Self {
            instruments: instruments.clone(),
            dates,
            values,
        })
    }

    pub fn instruments(&self) -> &InstrumentSet {
        &self.instruments
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn mean(&self) -> Array1<f64> {
        self.values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.instruments.len()))
    }

    pub fn covariance(&self) -> Array2<f64> {
        let n_assets = self.instruments.len();
        let rows = self.len();
        if rows < 2 {
            return Array2::zeros((n_assets, n_assets));
        }
        let centered = &self.values - &self.mean().insert_axis(Axis(0));
        centered.t().dot(&centered) / (rows as f64 - 1.0)
    }

    pub fn annualized_covariance(&self) -> Array2<f64> {
        self.covariance() * TRADING_DAYS_PER_YEAR
    }
}

use crate::chart::{self, ChartRenderer};
use crate::config::Settings;
use crate::domain::allocation::{Allocation, WeightEntry};
use crate::domain::instruments::{InstrumentSet, RiskScore};
use crate::domain::policy::RiskTier;
use crate::error::EngineError;
use crate::market::loader;
use crate::market::provider::MarketDataProvider;
use crate::optimize::{AllocationOptimizer, ProjectedGradient};
use crate::time::window::DateRange;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationReport {
    pub weights: Vec<WeightEntry>,
    pub explanation: String,
    pub tier: RiskTier,
    pub tier_number: u8,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub volatility: f64,
    pub expected_return: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observations: usize,
    pub solver_iterations: usize,
    pub chart_file: Option<String>,
}

impl RecommendationReport {
    fn new(allocation: &Allocation, range: DateRange, observations: usize) -> Self {
        Self {
            weights: allocation.entries(),
            explanation: allocation.explanation().to_string(),
            tier: allocation.tier(),
            tier_number: allocation.tier().number(),
            lower_bound: allocation.policy.lower,
            upper_bound: allocation.policy.upper,
            volatility: allocation.volatility,
            expected_return: allocation.expected_return,
            start_date: range.start,
            end_date: range.end,
            observations,
            solver_iterations: allocation.iterations,
            chart_file: None,
        }
    }
}

pub fn parse_request(tickers: &str, score: &str) -> Result<(InstrumentSet, RiskScore), EngineError> {
    Ok((InstrumentSet::parse_csv(tickers)?, RiskScore::parse(score)?))
}

struct ChartOutput {
    renderer: Arc<dyn ChartRenderer>,
    dir: PathBuf,
}

pub struct Recommender {
    provider: Arc<dyn MarketDataProvider>,
    optimizer: AllocationOptimizer,
    chart: Option<ChartOutput>,
    lookback_days: i64,
}

impl Recommender {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            optimizer: AllocationOptimizer::new(Arc::new(ProjectedGradient::with_max_iters(
                settings.solver_max_iters,
            ))),
            chart: Some(ChartOutput {
                renderer: settings.chart_format.renderer(),
                dir: settings.chart_dir.clone(),
            }),
            lookback_days: settings.lookback_days,
        }
    }

    pub fn with_chart(mut self, renderer: Arc<dyn ChartRenderer>, dir: PathBuf) -> Self {
        self.chart = Some(ChartOutput { renderer, dir });
        self
    }

    pub fn without_chart(mut self) -> Self {
        self.chart = None;
        self
    }

    pub fn chart_dir(&self) -> Option<&std::path::Path> {
        self.chart.as_ref().map(|c| c.dir.as_path())
    }

    pub async fn recommend(
        &self,
        instruments: &InstrumentSet,
        score: RiskScore,
    ) -> Result<RecommendationReport, EngineError> {
        self.recommend_at(instruments, score, Utc::now()).await
    }

    pub async fn recommend_at(
        &self,
        instruments: &InstrumentSet,
        score: RiskScore,
        now: DateTime<Utc>,
    ) -> Result<RecommendationReport, EngineError> {
        let range = DateRange::lookback(now, self.lookback_days)?;
        let returns = loader::fetch_returns(self.provider.as_ref(), instruments, range).await?;
        let allocation = self.optimizer.recommend(instruments, &returns, score)?;

        let mut report = RecommendationReport::new(&allocation, range, returns.len());
        if let Some(chart) = &self.chart {
            let file = chart::write_chart(
                chart.renderer.as_ref(),
                &chart.dir,
                instruments,
                &allocation.weights,
            )
            .map_err(EngineError::Chart)?;
            report.chart_file = Some(file);
        }

        tracing::info!(
            instruments = instruments.len(),
            score = score.value(),
            tier = report.tier_number,
            volatility = report.volatility,
            iterations = report.solver_iterations,
            chart = report.chart_file.as_deref().unwrap_or("-"),
            "recommendation ready"
        );
        Ok(report)
    }
}

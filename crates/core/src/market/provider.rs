use crate::config::Settings;
use crate::domain::instruments::InstrumentSet;
use crate::market::types::{ChartResponse, PricePoint, PriceSeries};
use crate::time::window::DateRange;
use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_adjusted_closes(
        &self,
        instruments: &InstrumentSet,
        range: DateRange,
    ) -> Result<Vec<PriceSeries>>;
}

#[derive(Debug, Clone)]
pub struct HttpChartProvider {
    http: reqwest::Client,
    base_url: reqwest::Url,
    retries: u32,
    backoff_base: Duration,
}

impl HttpChartProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.market_data_base_url,
            Duration::from_secs(
                settings
                    .market_data_timeout_secs
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            settings.market_data_retries.unwrap_or(DEFAULT_RETRIES),
        )
    }

    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        anyhow::ensure!(!base_url.trim().is_empty(), "market data base url must be non-empty");
        let base_url = reqwest::Url::parse(base_url.trim())
            .with_context(|| format!("invalid market data base url {base_url}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "market data base url {base_url} cannot carry a path"
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            retries: retries.max(1),
            backoff_base: Duration::from_secs(1),
        })
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    fn url(&self, ticker: &str) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("market data base url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        Ok(url)
    }

    async fn fetch_once(&self, ticker: &str, range: DateRange) -> Result<PriceSeries> {
        let (period1, period2) = range.unix_bounds();

        let res = self
            .http
            .get(self.url(ticker)?)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("market data request for {ticker} failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read market data response for {ticker}"))?;

        if status == StatusCode::NOT_FOUND {
            tracing::warn!(%ticker, "market data source does not know this instrument");
            return Ok(PriceSeries::empty(ticker));
        }
        if !status.is_success() {
            anyhow::bail!("market data HTTP {status} for {ticker}: {text}");
        }

        parse_chart(ticker, &text)
    }

    async fn fetch_with_retry(&self, ticker: &str, range: DateRange) -> Result<PriceSeries> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker, range).await {
                Ok(series) => return Ok(series),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_delay(self.backoff_base, attempt);
                    tracing::warn!(%ticker, attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpChartProvider {
    fn provider_name(&self) -> &'static str {
        "http_chart"
    }

    async fn fetch_adjusted_closes(
        &self,
        instruments: &InstrumentSet,
        range: DateRange,
    ) -> Result<Vec<PriceSeries>> {
        let mut out = Vec::with_capacity(instruments.len());
        for ticker in instruments {
            let series = self.fetch_with_retry(ticker, range).await?;
            tracing::debug!(
                %ticker,
                points = series.points.len(),
                usable = series.usable_len(),
                "fetched adjusted closes"
            );
            out.push(series);
        }
        Ok(out)
    }
}

pub(crate) fn parse_chart(ticker: &str, body: &str) -> Result<PriceSeries> {
    let parsed: ChartResponse = serde_json::from_str(body)
        .with_context(|| format!("market data response for {ticker} is not a chart payload"))?;

    if let Some(err) = parsed.chart.error {
        tracing::warn!(%ticker, code = %err.code, description = %err.description, "market data source reported an error");
        return Ok(PriceSeries::empty(ticker));
    }

    let Some(result) = parsed.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::empty(ticker));
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let adj = result
        .indicators
        .adj_close
        .and_then(|ac| ac.into_iter().next())
        .and_then(|ac| ac.adj_close);
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .unwrap_or_default();

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .with_context(|| format!("invalid timestamp {ts} for {ticker}"))?
            .date_naive();
        let adj_close = match &adj {
            Some(adj) => adj.get(i).copied().flatten(),
            None => closes.get(i).copied().flatten(),
        };
        points.push(PricePoint { date, adj_close });
    }

    Ok(PriceSeries {
        ticker: ticker.to_string(),
        points,
    })
}

pub mod chart;
pub mod domain;
pub mod error;
pub mod market;
pub mod optimize;
pub mod service;
pub mod time;

pub use error::EngineError;

pub mod config {
    use crate::chart::ChartFormat;
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;
    pub const DEFAULT_CHART_DIR: &str = "static/images";
    pub const DEFAULT_SOLVER_MAX_ITERS: usize = 1000;
    pub const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: String,
        pub market_data_timeout_secs: Option<u64>,
        pub market_data_retries: Option<u32>,
        pub lookback_days: i64,
        pub chart_dir: PathBuf,
        pub chart_format: ChartFormat,
        pub solver_max_iters: usize,
        pub port: u16,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                sentry_dsn: None,
                market_data_base_url: DEFAULT_MARKET_DATA_BASE_URL.to_string(),
                market_data_timeout_secs: None,
                market_data_retries: None,
                lookback_days: DEFAULT_LOOKBACK_DAYS,
                chart_dir: PathBuf::from(DEFAULT_CHART_DIR),
                chart_format: ChartFormat::default(),
                solver_max_iters: DEFAULT_SOLVER_MAX_ITERS,
                port: DEFAULT_PORT,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();
            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(defaults.market_data_base_url),
                market_data_timeout_secs: parse_env("MARKET_DATA_TIMEOUT_SECS")?,
                market_data_retries: parse_env("MARKET_DATA_RETRIES")?,
                lookback_days: parse_env("LOOKBACK_DAYS")?.unwrap_or(defaults.lookback_days),
                chart_dir: std::env::var("CHART_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or(defaults.chart_dir),
                chart_format: match std::env::var("CHART_FORMAT") {
                    Ok(raw) if !raw.trim().is_empty() => {
                        ChartFormat::parse(&raw).context("invalid CHART_FORMAT")?
                    }
                    _ => defaults.chart_format,
                },
                solver_max_iters: parse_env("SOLVER_MAX_ITERS")?
                    .unwrap_or(defaults.solver_max_iters),
                port: parse_env("PORT")?.unwrap_or(defaults.port),
            })
        }
    }

    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} must be a valid number (got {raw:?})")),
            _ => Ok(None),
        }
    }
}

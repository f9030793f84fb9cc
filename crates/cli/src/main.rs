use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use allocation_core::chart::ChartFormat;
use allocation_core::market::memory::InMemoryProvider;
use allocation_core::market::provider::{HttpChartProvider, MarketDataProvider};
use allocation_core::service::{parse_request, RecommendationReport, Recommender};

#[derive(Debug, Parser)]
#[command(name = "allocation_cli")]
struct Args {
    /// Comma-separated instrument identifiers, e.g. "AAPL, MSFT, GOOG".
    #[arg(long)]
    tickers: String,

    /// Risk tolerance score (0-100).
    #[arg(long, allow_hyphen_values = true)]
    score: String,

    /// Days of history to load. Defaults to LOOKBACK_DAYS or 365.
    #[arg(long)]
    lookback_days: Option<i64>,

    /// Read prices from a JSON file instead of the market data service.
    #[arg(long)]
    prices_file: Option<PathBuf>,

    /// Where to write the pie chart. Defaults to CHART_DIR.
    #[arg(long)]
    chart_dir: Option<PathBuf>,

    /// png or svg. Defaults to CHART_FORMAT or png.
    #[arg(long)]
    chart_format: Option<String>,

    /// Skip writing the chart.
    #[arg(long)]
    no_chart: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = allocation_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(days) = args.lookback_days {
        settings.lookback_days = days;
    }
    if let Some(dir) = args.chart_dir.clone() {
        settings.chart_dir = dir;
    }
    if let Some(format) = &args.chart_format {
        settings.chart_format = ChartFormat::parse(format)?;
    }

    let provider: Arc<dyn MarketDataProvider> = match &args.prices_file {
        Some(path) => Arc::new(InMemoryProvider::from_json_file(path)?),
        None => Arc::new(HttpChartProvider::from_settings(&settings)?),
    };

    let mut recommender = Recommender::new(provider, &settings);
    if args.no_chart {
        recommender = recommender.without_chart();
    }

    let (instruments, score) = parse_request(&args.tickers, &args.score)?;
    let report = match recommender.recommend(&instruments, score).await {
        Ok(report) => report,
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "recommendation failed");
            return Err(err);
        }
    };

    if args.json {
        let out = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{out}");
    } else {
        print_report(&report, recommender.chart_dir());
    }

    Ok(())
}

fn print_report(report: &RecommendationReport, chart_dir: Option<&std::path::Path>) {
    println!(
        "Risk tier {} ({:?}), weights between {:.0}% and {:.0}%",
        report.tier_number,
        report.tier,
        report.lower_bound * 100.0,
        report.upper_bound * 100.0
    );
    println!(
        "History {} .. {} ({} daily returns)",
        report.start_date, report.end_date, report.observations
    );
    println!();

    let width = report
        .weights
        .iter()
        .map(|w| w.ticker.len())
        .max()
        .unwrap_or(6)
        .max(6);
    for entry in &report.weights {
        println!("  {:<width$}  {:>6}%", entry.ticker, entry.percent);
    }
    println!();
    println!("Annualized volatility: {:.2}%", report.volatility * 100.0);
    println!(
        "Annualized mean return: {:.2}% (not optimized)",
        report.expected_return * 100.0
    );
    println!("Solver iterations: {}", report.solver_iterations);
    println!("{}", report.explanation);

    if let (Some(file), Some(dir)) = (&report.chart_file, chart_dir) {
        println!("Chart: {}", dir.join(file).display());
    }
}

fn init_sentry(settings: &allocation_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "allocation_cli",
            "--tickers",
            "AAPL, MSFT",
            "--score",
            "-5",
            "--prices-file",
            "prices.json",
            "--no-chart",
            "--chart-format",
            "svg",
        ])
        .unwrap();
        assert_eq!(args.tickers, "AAPL, MSFT");
        assert_eq!(args.score, "-5");
        assert_eq!(args.prices_file, Some(PathBuf::from("prices.json")));
        assert!(args.no_chart);
        assert_eq!(args.chart_format.as_deref(), Some("svg"));
        assert!(!args.json);
    }

    #[test]
    fn tickers_and_score_are_required() {
        assert!(Args::try_parse_from(["allocation_cli", "--score", "50"]).is_err());
        assert!(Args::try_parse_from(["allocation_cli", "--tickers", "AAPL"]).is_err());
    }
}

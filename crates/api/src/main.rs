use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use allocation_core::market::provider::HttpChartProvider;
use allocation_core::service::{parse_request, RecommendationReport, Recommender};
use allocation_core::EngineError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = allocation_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let provider = HttpChartProvider::from_settings(&settings)?;
    let recommender = Recommender::new(Arc::new(provider), &settings);

    std::fs::create_dir_all(&settings.chart_dir)?;
    let state = AppState {
        recommender: Arc::new(recommender),
    };

    let app = router(state, &settings.chart_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, chart_dir = %settings.chart_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState, chart_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommend", post(recommend))
        .nest_service("/charts", ServeDir::new(chart_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    recommender: Arc<Recommender>,
}

/// Form fields as posted by the recommendation page.
#[derive(Debug, Deserialize)]
struct RecommendForm {
    #[serde(default)]
    tickers: String,
    #[serde(default)]
    score: String,
}

#[derive(Debug, Serialize)]
struct ApiRecommendation {
    #[serde(flatten)]
    report: RecommendationReport,
    chart_url: Option<String>,
}

async fn recommend(
    State(state): State<AppState>,
    Form(form): Form<RecommendForm>,
) -> Result<Json<ApiRecommendation>, ApiError> {
    let (instruments, score) = parse_request(&form.tickers, &form.score)?;
    let report = state.recommender.recommend(&instruments, score).await?;
    let chart_url = report
        .chart_file
        .as_ref()
        .map(|file| format!("/charts/{file}"));
    Ok(Json(ApiRecommendation { report, chart_url }))
}

#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::DataUnavailable(_) | EngineError::Infeasible { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::MarketData(_) => StatusCode::BAD_GATEWAY,
        EngineError::NotConverged { .. } | EngineError::Chart(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };

        if status.is_server_error() {
            let err = anyhow::Error::new(self.0);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%status, error = %format!("{err:#}"), "recommendation failed");
        } else {
            tracing::warn!(%status, kind = body.error, error = %body.message, "recommendation rejected");
        }

        (status, Json(body)).into_response()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

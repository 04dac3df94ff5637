// Main entry point for the catalog image translation service

use catalog_translator::{
    core::{Config, RunSummary},
    orchestration::{BatchOrchestrator, BatchRunner, PipelineOutcome},
    utils::Metrics,
    PipelineError,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Owns batch runs and the last run's result
    runner: BatchRunner,
    metrics: Metrics,
}

#[derive(Debug, Deserialize)]
struct TestOcrParams {
    img: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "catalog_translator={},tower_http=info",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== CATALOG IMAGE TRANSLATOR ===");
    info!(
        "Config: store={} api={} page_size={} target={} concurrency={}",
        config.catalog.store_domain,
        config.catalog.api_version,
        config.catalog.page_size,
        config.translation.target_language,
        config.max_concurrent_images()
    );

    // Initialize metrics
    let metrics = Metrics::new();

    info!("Initializing batch orchestrator...");
    let orchestrator = Arc::new(BatchOrchestrator::new(config.clone(), metrics.clone())?);
    let state = AppState {
        config: config.clone(),
        runner: BatchRunner::new(orchestrator),
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/start", get(start_translation))
        .route("/start-translation", get(start_translation))
        .route("/test-ocr", get(test_ocr))
        .route("/failed", get(failed_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                  - Root endpoint");
    info!("  GET  /health            - Health check");
    info!("  GET  /start             - Translate every catalog image");
    info!("  GET  /start-translation - Alias of /start");
    info!("  GET  /test-ocr?img=URL  - Translate one image, return JPEG");
    info!("  GET  /failed            - Failures of the last run");
    info!("  GET  /metrics           - Prometheus metrics");
    info!("  GET  /stats             - Detailed statistics");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Catalog image translator running"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.config.catalog.store_domain,
        "target_language": state.config.translation.target_language,
    }))
}

/// Run one batch over the whole catalog
///
/// # Response:
/// - 200 `RunSummary`
/// - 409 when a run is already in progress
/// - 500 `{error, details}` when products cannot be listed
async fn start_translation(State(state): State<AppState>) -> Response {
    state.metrics.record_endpoint_request("/start");

    let Some(run) = state.runner.start() else {
        warn!("Rejected /start: a run is already in progress");
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "A translation run is already in progress" })),
        )
            .into_response();
    };

    let start_time = Instant::now();
    info!("Received start request");

    // The run keeps going on its own task if this request is dropped
    match run.await {
        Ok(Ok(result)) => {
            info!(
                "Request completed in {:.2}s: {} updated, {} skipped, {} failed",
                start_time.elapsed().as_secs_f64(),
                result.succeeded,
                result.skipped,
                result.failed.len()
            );
            Json(RunSummary::from_run(&result)).into_response()
        }
        Ok(Err(e)) => {
            error!("Batch run failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to fetch products",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Batch run task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Translation run aborted",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Translate one image by URL and return the processed JPEG
async fn test_ocr(State(state): State<AppState>, Query(params): Query<TestOcrParams>) -> Response {
    state.metrics.record_endpoint_request("/test-ocr");

    let Some(url) = params.img.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing image URL").into_response();
    };

    match state.runner.orchestrator().translate_single(&url).await {
        Ok(PipelineOutcome::Rendered(rendered)) => {
            info!("Test OCR: {} region(s) translated for {}", rendered.translated.len(), url);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/jpeg")],
                rendered.jpeg,
            )
                .into_response()
        }
        Ok(PipelineOutcome::NoText) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "No text detected in image").into_response()
        }
        Ok(PipelineOutcome::NothingTranslated { regions }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("No translatable text ({} region(s) detected)", regions),
        )
            .into_response(),
        Err(PipelineError::Fetch(e)) => {
            warn!("Test OCR fetch failed: {}", e);
            (StatusCode::BAD_GATEWAY, format!("Failed to fetch image: {}", e)).into_response()
        }
        Err(PipelineError::Render(e)) => {
            error!("Test OCR render failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process image: {}", e),
            )
                .into_response()
        }
    }
}

/// Failures recorded by the last completed run
async fn failed_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/failed");

    let failed = state.runner.last_run().map(|r| r.failed).unwrap_or_default();
    Json(serde_json::json!({
        "failed_updates": failed.len(),
        "failed_logs": failed,
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot)
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize metrics: {}", e),
            )
        })
}

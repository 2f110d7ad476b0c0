use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use daybook_core::config::ServeConfig;
use daybook_core::{Job, ReportDate};
use daybook_pipeline::{Pipeline, ProgressView};

// ── App State ──

struct AppState {
    pipeline: Arc<Pipeline>,
}

// ── Error Handling ──

struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    fn not_found(what: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!(what),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(error = %format!("{:#}", self.error), "request failed");
        }
        let body = serde_json::json!({ "error": format!("{:#}", self.error) });
        (self.status, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

fn parse_date(raw: &str) -> Result<ReportDate, AppError> {
    ReportDate::parse(raw).map_err(AppError::bad_request)
}

// ── Entrypoint ──

/// Bind and serve until `shutdown` is cancelled.
pub async fn serve(
    pipeline: Arc<Pipeline>,
    config: &ServeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(pipeline);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "daybook HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = Arc::new(AppState { pipeline });
    Router::new()
        .route("/api/health", get(health))
        .route("/api/reports/{date}", get(get_report))
        .route("/api/summaries/{date}", get(get_summary))
        .route("/api/progress/{date}", get(get_progress))
        .route("/api/reports/regenerate/{date}", post(post_regenerate))
        .route("/api/process-queue", post(post_process_queue))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── GET /api/reports/{date} ──

async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Response, AppError> {
    let date = parse_date(&date)?;
    let json = state
        .pipeline
        .store()
        .report_json(date)?
        .ok_or_else(|| AppError::not_found(format!("no report for {date}")))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
}

// ── GET /api/summaries/{date} ──

async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Response, AppError> {
    let date = parse_date(&date)?;
    let Some(summaries) = state.pipeline.summary_store() else {
        return Err(AppError::not_found("summaries are not enabled".into()));
    };
    let text = summaries
        .get(date)?
        .ok_or_else(|| AppError::not_found(format!("no summary for {date}")))?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], text).into_response())
}

// ── GET /api/progress/{date} ──

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<ProgressView>, AppError> {
    let date = parse_date(&date)?;
    Ok(Json(state.pipeline.progress(date)?))
}

// ── POST /api/reports/regenerate/{date} ──

#[derive(Serialize)]
struct RegenerateResponse {
    date: ReportDate,
    jobs: usize,
}

async fn post_regenerate(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<(StatusCode, Json<RegenerateResponse>), AppError> {
    let date = parse_date(&date)?;
    let jobs = state.pipeline.decompose(date).await?;
    info!(%date, jobs, "manual regeneration queued");
    Ok((StatusCode::ACCEPTED, Json(RegenerateResponse { date, jobs })))
}

// ── POST /api/process-queue ──

#[derive(Serialize)]
struct ProcessResponse {
    success: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    outcome: &'static str,
}

async fn post_process_queue(
    State(state): State<Arc<AppState>>,
    Json(job): Json<Job>,
) -> Response {
    match state.pipeline.process(&job).await {
        Ok(outcome) => Json(ProcessResponse {
            success: true,
            kind: job.kind(),
            outcome: outcome.as_str(),
        })
        .into_response(),
        Err(e) => {
            error!(job = %job, error = %format!("{e:#}"), "manual job failed");
            let body = serde_json::json!({ "success": false, "error": format!("{e:#}") });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ── Tests ──

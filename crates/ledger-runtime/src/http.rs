//! HTTP surface: one upload endpoint and one summary endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_core::error::{LedgerError, LoadError};
use ledger_core::models::{Granularity, LoadRequest, PeriodSummary, DEFAULT_HEADER_ROWS_TO_SKIP};
use ledger_core::settings::is_allowed_table;
use ledger_data::{PeriodAggregator, TableLoader};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::jobs::{load_in_background, summarize_in_background, StagedUpload};

/// Largest accepted upload body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub loader: Arc<TableLoader>,
    pub aggregator: Arc<PeriodAggregator>,
    /// Directory where uploads are staged before loading.
    pub staging_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(loader: Arc<TableLoader>, aggregator: Arc<PeriodAggregator>) -> Self {
        Self {
            loader,
            aggregator,
            staging_dir: std::env::temp_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error body `{"error": message}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Keep the status axum assigns, e.g. 413 when the body limit is hit.
    fn multipart(context: &str, err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: format!("{context}: {}", err.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidGranularity(_) => StatusCode::BAD_REQUEST,
            LedgerError::TableNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::QueryFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/upload", post(upload_handler))
        .route("/summary", get(summary_handler))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl+C received; shutting down");
        })
        .await
        .context("serving HTTP")?;
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn healthz_handler() -> &'static str {
    "ok"
}

/// `POST /upload` with multipart fields `file`, `table` and optional `skip_rows`.
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut table: Option<String> = None;
    let mut skip_rows = DEFAULT_HEADER_ROWS_TO_SKIP;
    // Dropped on every return path, which removes the staged file.
    let mut staged: Option<StagedUpload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::multipart("malformed upload", e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("table") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::multipart("reading table field", e))?;
                table = Some(text.trim().to_string());
            }
            Some("skip_rows") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::multipart("reading skip_rows field", e))?;
                skip_rows = text
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::bad_request(format!("invalid skip_rows: {text:?}")))?;
            }
            Some("file") => {
                let mut upload = StagedUpload::create(&state.staging_dir)
                    .await
                    .map_err(|e| ApiError::internal(format!("staging upload: {e}")))?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::multipart("reading file field", e))?
                {
                    upload
                        .write_chunk(&chunk)
                        .await
                        .map_err(|e| ApiError::internal(format!("staging upload: {e}")))?;
                }
                upload
                    .finish()
                    .await
                    .map_err(|e| ApiError::internal(format!("staging upload: {e}")))?;
                staged = Some(upload);
            }
            _ => {}
        }
    }

    let table = table
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing form field \"table\""))?;
    if !is_allowed_table(&table) {
        return Err(ApiError::bad_request(format!("table {table:?} cannot be loaded")));
    }
    let staged = staged.ok_or_else(|| ApiError::bad_request("missing form field \"file\""))?;

    let request = LoadRequest::new(staged.path(), table).with_header_rows_to_skip(skip_rows);
    match load_in_background(Arc::clone(&state.loader), request).await {
        Ok(summary) => {
            info!(table = %summary.table, rows = summary.rows_loaded, bytes = staged.len(), "upload loaded");
            Ok(Json(json!({
                "status": "ok",
                "table": summary.table,
                "job_id": summary.job_id,
                "rows_loaded": summary.rows_loaded,
            })))
        }
        Err(e) => {
            warn!(error = %e, "upload failed");
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    granularity: Option<String>,
}

/// `GET /summary?granularity=day|month`.
async fn summary_handler(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Vec<PeriodSummary>>, ApiError> {
    let raw = params
        .granularity
        .ok_or_else(|| ApiError::bad_request("missing query parameter \"granularity\""))?;
    let granularity: Granularity = raw.parse()?;

    let periods = summarize_in_background(Arc::clone(&state.aggregator), granularity).await?;
    Ok(Json(periods))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! JSON HTTP API for browsing leads and scanning cards.
//!
//! # Endpoints
//!
//! | Method   | Path          | Description |
//! |----------|---------------|-------------|
//! | `GET`    | `/health`     | Health check (returns version) |
//! | `GET`    | `/leads`      | Newest leads first, `?limit=n` |
//! | `GET`    | `/leads/{id}` | One lead |
//! | `DELETE` | `/leads/{id}` | Delete one lead |
//! | `POST`   | `/scan`       | Run the pipeline on a base64 image and store the lead |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "image_base64 is not valid base64" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413, over `[server].max_body_mb`), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::image::CardImage;
use crate::leads;
use crate::models::Lead;
use crate::pipeline::{BatchPosition, CardInput, Pipeline};
use crate::progress::NoProgress;
use crate::scan::{resolve_qualification, scan_card, ScanOutcome};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    /// `None` when the pipeline could not be built (usually a missing API
    /// key); browsing still works and `POST /scan` reports the reason.
    pipeline: Option<Arc<Pipeline>>,
    pipeline_error: Option<String>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pool: SqlitePool, pipeline: Option<Arc<Pipeline>>) -> Self {
        Self {
            config,
            pool,
            pipeline,
            pipeline_error: None,
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = leads::open(config).await?;

    let (pipeline, pipeline_error) = match Pipeline::from_config(config) {
        Ok(p) => (Some(Arc::new(p)), None),
        Err(e) => {
            tracing::warn!(error = %e, "scanning disabled");
            (None, Some(format!("{:#}", e)))
        }
    };

    let mut state = AppState::new(Arc::new(config.clone()), pool, pipeline);
    state.pipeline_error = pipeline_error;

    println!("Card intake API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.server.max_body_bytes());
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/leads", get(handle_list_leads))
        .route("/leads/{id}", get(handle_get_lead).delete(handle_delete_lead))
        .route("/scan", post(handle_scan))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Malformed bodies become `bad_request`; oversized ones keep 413.
fn json_rejection(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "payload_too_large",
            message: rejection.body_text(),
        };
    }
    bad_request(rejection.body_text())
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /leads ============

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct LeadListResponse {
    leads: Vec<Lead>,
}

async fn handle_list_leads(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LeadListResponse>, AppError> {
    let limit = query.limit.unwrap_or(state.config.leads.list_limit);
    if limit < 1 {
        return Err(bad_request("limit must be at least 1"));
    }
    let leads = leads::list_leads(&state.pool, Some(limit))
        .await
        .map_err(internal)?;
    Ok(Json(LeadListResponse { leads }))
}

async fn handle_get_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    leads::get_lead(&state.pool, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("lead not found: {}", id)))
}

async fn handle_delete_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !leads::delete_lead(&state.pool, id).await.map_err(internal)? {
        return Err(not_found(format!("lead not found: {}", id)));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ POST /scan ============

#[derive(Deserialize)]
struct ScanRequest {
    file_name: String,
    /// Plain base64 or a `data:<mime>;base64,` URI.
    image_base64: String,
    #[serde(default)]
    qualification: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct ScanResponse {
    duplicate: bool,
    lead: Lead,
}

async fn handle_scan(
    State(state): State<AppState>,
    req: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, AppError> {
    let Json(req) = req.map_err(json_rejection)?;

    let Some(pipeline) = state.pipeline.as_ref() else {
        let reason = state
            .pipeline_error
            .clone()
            .unwrap_or_else(|| "pipeline not configured".to_string());
        return Err(internal(anyhow::anyhow!("scanning unavailable: {}", reason)));
    };

    if req.file_name.trim().is_empty() {
        return Err(bad_request("file_name must not be empty"));
    }
    let payload = match req.image_base64.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => req.image_base64.as_str(),
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| bad_request("image_base64 is not valid base64"))?;
    let image = CardImage::from_bytes(req.file_name.clone(), bytes)
        .map_err(|e| bad_request(e.to_string()))?;
    let qualification = resolve_qualification(&state.config, req.qualification.as_deref())
        .map_err(|e| bad_request(e.to_string()))?;

    let input = CardInput {
        image,
        qualification,
        note: req.note.unwrap_or_default(),
        source_file: Some(req.file_name),
    };

    let outcome = scan_card(
        &state.pool,
        pipeline,
        input,
        req.force,
        &NoProgress,
        BatchPosition::SINGLE,
    )
    .await
    .map_err(internal)?;

    Ok(Json(match outcome {
        ScanOutcome::Stored(lead) => ScanResponse {
            duplicate: false,
            lead,
        },
        ScanOutcome::Duplicate(lead) => ScanResponse {
            duplicate: true,
            lead,
        },
    }))
}

//! Web server module for blockwatch.
//!
//! JSON API over the block store, the collection scheduler and storage
//! administration. Successful responses are `{ "success": true, "data": .. }`;
//! failures are `{ "error": .., "message": .. }` with a 4xx/5xx status.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::collector::{CollectionScheduler, CollectorError, CollectorStats, SchedulerStatus};
use crate::retention::RetentionManager;
use crate::storage::{
    Block, BlockPage, BlockStats, BlockStore, CleanupOptions, DEFAULT_STATS_WINDOW, DatabaseStats,
    SECONDS_PER_DAY, StorageAdmin, StorageError,
};

/// Default page size for `GET /api/blocks`.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub blocks: BlockStore,
    pub admin: StorageAdmin,
    pub scheduler: Arc<CollectionScheduler>,
    pub retention: Arc<RetentionManager>,
}

/// Successful response envelope.
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Handler failure, mapped to a status code.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if err.is_validation() {
            Self::BadRequest(err.to_string())
        } else {
            tracing::error!(error = %err, "Storage operation failed");
            Self::Internal(err.to_string())
        }
    }
}

impl From<CollectorError> for ApiError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Config(msg) => Self::BadRequest(msg),
            CollectorError::Storage(e) => e.into(),
            other => {
                tracing::error!(error = %other, "Collector operation failed");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, "Bad request", m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, "Not found", m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", m),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Banner {
    message: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
}

/// Query parameters for listing and export endpoints.
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlock {
    latest_block_number: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResult {
    triggered: bool,
    collection_success: bool,
    stats: CollectorStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Acknowledged {
    message: &'static str,
    timestamp: DateTime<Utc>,
}

fn acknowledged(message: &'static str) -> Json<ApiResponse<Acknowledged>> {
    ok(Acknowledged {
        message,
        timestamp: Utc::now(),
    })
}

/// Body of `PUT /api/collector/interval`.
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub seconds: u64,
}

/// Body of `POST /api/database/cleanup`. The first non-zero field wins.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub keep_latest: Option<u32>,
    pub older_than_days: Option<u32>,
    pub before_block_number: Option<i64>,
}

impl From<CleanupRequest> for CleanupOptions {
    fn from(req: CleanupRequest) -> Self {
        CleanupOptions {
            keep_latest: req.keep_latest,
            older_than_secs: req.older_than_days.map(|d| i64::from(d) * SECONDS_PER_DAY),
            before_block_number: req.before_block_number,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    deleted_count: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoCleanupResult {
    performed: bool,
    deleted_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Export {
    blocks: Vec<Block>,
    count: usize,
    exported_at: DateTime<Utc>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(banner_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/blocks", get(blocks_handler))
        .route("/api/blocks/stats", get(block_stats_handler))
        .route("/api/blocks/latest", get(latest_block_handler))
        .route("/api/collector/status", get(collector_status_handler))
        .route("/api/collector/trigger", post(collector_trigger_handler))
        .route("/api/collector/start", post(collector_start_handler))
        .route("/api/collector/stop", post(collector_stop_handler))
        .route("/api/collector/reset-stats", post(collector_reset_handler))
        .route("/api/collector/interval", put(collector_interval_handler))
        .route("/api/database/stats", get(database_stats_handler))
        .route("/api/database/clear", delete(database_clear_handler))
        .route("/api/database/cleanup", post(database_cleanup_handler))
        .route("/api/database/auto-cleanup", post(database_auto_cleanup_handler))
        .route("/api/database/optimize", post(database_optimize_handler))
        .route("/api/database/export", get(database_export_handler))
        .fallback(not_found_handler)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn banner_handler() -> Json<Banner> {
    Json(Banner {
        message: "blockwatch API is running",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks SQLite availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.blocks.latest_block_number().await {
        Ok(_) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {} not found", uri.path()))
}

// =============================================================================
// Blocks
// =============================================================================

async fn blocks_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<BlockPage> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    Ok(ok(state.blocks.range(limit).await?))
}

async fn block_stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<BlockStats> {
    Ok(ok(state.blocks.aggregate_stats(DEFAULT_STATS_WINDOW).await?))
}

async fn latest_block_handler(State(state): State<Arc<AppState>>) -> ApiResult<LatestBlock> {
    let latest_block_number = state.blocks.latest_block_number().await?;
    Ok(ok(LatestBlock {
        latest_block_number,
    }))
}

// =============================================================================
// Collector
// =============================================================================

async fn collector_status_handler(State(state): State<Arc<AppState>>) -> ApiResult<SchedulerStatus> {
    Ok(ok(state.scheduler.status()))
}

async fn collector_trigger_handler(State(state): State<Arc<AppState>>) -> ApiResult<TriggerResult> {
    let collection_success = state.scheduler.trigger_manual_collection().await;
    Ok(ok(TriggerResult {
        triggered: true,
        collection_success,
        stats: state.scheduler.collector().stats(),
    }))
}

async fn collector_start_handler(State(state): State<Arc<AppState>>) -> ApiResult<SchedulerStatus> {
    state.scheduler.start().await?;
    Ok(ok(state.scheduler.status()))
}

async fn collector_stop_handler(State(state): State<Arc<AppState>>) -> ApiResult<SchedulerStatus> {
    state.scheduler.stop();
    Ok(ok(state.scheduler.status()))
}

async fn collector_reset_handler(State(state): State<Arc<AppState>>) -> ApiResult<Acknowledged> {
    state.scheduler.collector().reset_stats();
    Ok(acknowledged("Collector stats reset"))
}

async fn collector_interval_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IntervalRequest>,
) -> ApiResult<SchedulerStatus> {
    state.scheduler.update_interval(req.seconds).await?;
    Ok(ok(state.scheduler.status()))
}

// =============================================================================
// Database administration
// =============================================================================

async fn database_stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<DatabaseStats> {
    Ok(ok(state.admin.database_stats().await?))
}

async fn database_clear_handler(State(state): State<Arc<AppState>>) -> ApiResult<Deleted> {
    let deleted_count = state.admin.delete_all().await?;
    Ok(ok(Deleted {
        deleted_count,
        timestamp: Utc::now(),
    }))
}

async fn database_cleanup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> ApiResult<Deleted> {
    let options = CleanupOptions::from(req);
    let deleted_count = state.admin.delete_where(&options).await?;
    Ok(ok(Deleted {
        deleted_count,
        timestamp: Utc::now(),
    }))
}

async fn database_auto_cleanup_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<AutoCleanupResult> {
    let deleted = state.retention.auto_cleanup().await;
    Ok(ok(AutoCleanupResult {
        performed: deleted.is_some(),
        deleted_count: deleted.unwrap_or(0),
    }))
}

async fn database_optimize_handler(State(state): State<Arc<AppState>>) -> ApiResult<Acknowledged> {
    state.admin.compact().await?;
    Ok(acknowledged("Database optimized"))
}

async fn database_export_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Export> {
    let blocks = state.admin.export(params.limit).await?;
    Ok(ok(Export {
        count: blocks.len(),
        blocks,
        exported_at: Utc::now(),
    }))
}

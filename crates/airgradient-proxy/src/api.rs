//! HTTP endpoints.
//!
//! The six proxy routes answer with the device-native JSON shape so that
//! existing AirGradient clients can point at the proxy instead of the
//! monitor. Two extra routes under `/api` report health and poller status.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **`state.store`** (Mutex): held only for the duration of one query.
//! - **`state.two_minute`** (RwLock): read lock for the two-minute record.
//! - **`state.poller.stats`** (RwLock): read lock for `/api/status`.
//!
//! No handler holds more than one of these at a time.
//!
//! ## Empty Results
//!
//! "No data yet" is not an error. Record endpoints answer `{}` and
//! `/get-earliest-timestamp` answers `{}` until the archive has a record.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

use airgradient_types::{AveragedRecord, Measurement};

use crate::query::{ArchiveParams, QueryEngine, QueryError};
use crate::state::{AppState, PollStats};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Proxy protocol
        .route("/measures/current", get(current_record))
        .route("/fetch-current-record", get(current_record))
        .route("/get-version", get(get_version))
        .route("/get-earliest-timestamp", get(earliest_timestamp))
        .route("/fetch-two-minute-record", get(two_minute_record))
        .route("/fetch-archive-records", get(archive_records))
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
}

/// A value, or `{}` when there is none.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OrEmpty<T> {
    Value(T),
    Empty {},
}

impl<T> From<Option<T>> for OrEmpty<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => OrEmpty::Value(v),
            None => OrEmpty::Empty {},
        }
    }
}

async fn current_record(State(state): State<Arc<AppState>>) -> Json<OrEmpty<Measurement>> {
    Json(QueryEngine::new(&state).current().into())
}

/// `/get-version` response.
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

async fn get_version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: QueryEngine::new(&state).version(),
    })
}

/// `/get-earliest-timestamp` response when the archive is not empty.
#[derive(Debug, Serialize)]
pub struct EarliestTimestamp {
    pub timestamp: i64,
}

async fn earliest_timestamp(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrEmpty<EarliestTimestamp>>, QueryError> {
    let earliest = QueryEngine::new(&state).earliest_timestamp().await?;
    Ok(Json(
        earliest.map(|timestamp| EarliestTimestamp { timestamp }).into(),
    ))
}

async fn two_minute_record(State(state): State<Arc<AppState>>) -> Json<OrEmpty<AveragedRecord>> {
    Json(QueryEngine::new(&state).two_minute_record().await.into())
}

/// Archived records, oldest first.
///
/// # Errors
///
/// - Returns [`QueryError::InvalidQuery`] (HTTP 400) if `since_ts` is missing,
///   a parameter is not an integer or is repeated, or `limit <= 0`
/// - Returns [`QueryError::Store`] (HTTP 500) if the database query fails
async fn archive_records(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ArchiveParams>, QueryRejection>,
) -> Result<Json<Vec<AveragedRecord>>, QueryError> {
    let Query(params) = params.map_err(|e| QueryError::InvalidQuery(e.body_text()))?;
    let records = QueryEngine::new(&state).archive_records(&params).await?;
    Ok(Json(records))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub poller: PollerStatus,
    pub archive: ArchiveStatus,
}

/// Poller status.
#[derive(Debug, Serialize)]
pub struct PollerStatus {
    /// Whether the poller is running.
    pub running: bool,
    /// When the poller was started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// How long the poller has been running (in seconds).
    pub uptime_seconds: Option<u64>,
    pub poll_interval_secs: u64,
    pub archive_interval_secs: u64,
    #[serde(flatten)]
    pub stats: PollStats,
}

/// Archive summary.
#[derive(Debug, Serialize)]
pub struct ArchiveStatus {
    pub records: u64,
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, QueryError> {
    let now = OffsetDateTime::now_utc();
    let started_at = state.poller.started_at();
    let running = state.poller.is_running();
    let uptime_seconds = started_at
        .filter(|_| running)
        .map(|started| (now - started).whole_seconds().max(0) as u64);

    let archive = {
        let store = state.store.lock().await;
        ArchiveStatus {
            records: store.count()?,
            earliest: store.earliest_timestamp()?,
            latest: store.latest_timestamp(),
        }
    };

    let stats = state.poller.stats.read().await.clone();

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        poller: PollerStatus {
            running,
            started_at,
            uptime_seconds,
            poll_interval_secs: state.poller.poll_interval_secs,
            archive_interval_secs: state.poller.archive_interval_secs,
            stats,
        },
        archive,
    }))
}

impl IntoResponse for QueryError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            QueryError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            QueryError::Store(e) => {
                error!("Archive query failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

//! HTTP submission boundary and inspection endpoints.
//!
//! `POST /fib` validates form fields and enqueues a [`Job`]; the rest of the
//! routes read the ledger and pool snapshot or manage individual workers.

pub mod duration;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::PoolError;
use crate::pool::WorkerPool;
use crate::scheduler::Job;

pub use duration::{parse_duration, DurationParseError};

#[derive(Clone)]
pub struct ApiState {
    pub pool: Arc<WorkerPool>,
    pub config: ApiConfig,
}

/// Raw form fields of a submission. Everything is optional so that missing
/// fields surface as validation errors rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitForm {
    pub delay: Option<String>,
    pub value: Option<String>,
    pub name: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid Delay")]
    InvalidDelay,

    #[error("Invalid Value")]
    InvalidValue,

    #[error("Invalid Name")]
    InvalidName,
}

/// Turn a submission into a job. Checks run in field order: delay, value,
/// name.
pub fn validate_submission(
    form: &SubmitForm,
    max_value: u64,
    max_delay: Duration,
) -> Result<Job, ValidationError> {
    let delay = form
        .delay
        .as_deref()
        .and_then(|d| parse_duration(d).ok())
        .filter(|d| *d <= max_delay)
        .ok_or(ValidationError::InvalidDelay)?;

    let value = form
        .value
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v <= max_value)
        .ok_or(ValidationError::InvalidValue)?;

    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ValidationError::InvalidName)?;

    Ok(Job::new(name, delay, value))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pool(e) => match e {
                PoolError::QueueFull | PoolError::ShuttingDown | PoolError::RegistryClosed => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PoolError::EnqueueTimeout | PoolError::StopTimeout(_) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                PoolError::WorkerNotFound(_) => StatusCode::NOT_FOUND,
                PoolError::PoolAtCapacity(_) | PoolError::AlreadyRunning => StatusCode::CONFLICT,
            },
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

#[derive(Serialize, Deserialize)]
pub struct CleanupJobsResponse {
    pub removed: usize,
}

#[derive(Serialize, Deserialize)]
pub struct SpawnWorkerResponse {
    pub worker_id: usize,
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopQuery {
    wait: Option<bool>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fib", post(submit_handler))
        .route(
            "/api/jobs",
            get(list_jobs_handler).delete(cleanup_jobs_handler),
        )
        .route("/api/jobs/{id}", get(get_job_handler))
        .route("/api/pool", get(pool_stats_handler))
        .route("/api/workers", post(spawn_worker_handler))
        .route("/api/workers/{id}", delete(stop_worker_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn submit_handler(
    State(state): State<ApiState>,
    Form(form): Form<SubmitForm>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let job = match validate_submission(&form, state.config.max_value, state.config.max_delay) {
        Ok(job) => job,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected submission");
            return Err(e.into());
        }
    };

    let job_id = match state.config.enqueue_timeout {
        Some(limit) => state.pool.submit_wait(job, Some(limit)).await?,
        None => state.pool.submit(job).await?,
    };

    Ok((StatusCode::CREATED, Json(SubmitJobResponse { job_id })))
}

async fn list_jobs_handler(
    State(state): State<ApiState>,
    Query(query): Query<JobsQuery>,
) -> impl IntoResponse {
    let ledger = state.pool.ledger();
    let ledger = ledger.read().await;
    let records: Vec<_> = ledger
        .all()
        .into_iter()
        .filter(|r| match query.status.as_deref() {
            Some(status) => r.status.to_string() == status,
            None => true,
        })
        .cloned()
        .collect();
    Json(records)
}

/// Drop every finished record from the ledger. Queued and running jobs stay.
async fn cleanup_jobs_handler(State(state): State<ApiState>) -> Json<CleanupJobsResponse> {
    let removed = state.pool.ledger().write().await.cleanup_finished();
    tracing::info!(removed, "Cleaned up finished job records");
    Json(CleanupJobsResponse { removed })
}

async fn get_job_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.pool.ledger();
    let record = ledger.read().await.get(&id).cloned();
    record.map(Json).ok_or(ApiError::JobNotFound(id))
}

async fn pool_stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.pool.stats().await)
}

async fn spawn_worker_handler(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<SpawnWorkerResponse>), ApiError> {
    let worker_id = state.pool.spawn_worker().await?;
    Ok((StatusCode::CREATED, Json(SpawnWorkerResponse { worker_id })))
}

async fn stop_worker_handler(
    State(state): State<ApiState>,
    Path(id): Path<usize>,
    Query(query): Query<StopQuery>,
) -> Result<StatusCode, ApiError> {
    if query.wait.unwrap_or(false) {
        state
            .pool
            .stop_worker_and_wait(id, state.config.stop_timeout)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    } else {
        state.pool.stop_worker(id).await?;
        Ok(StatusCode::ACCEPTED)
    }
}

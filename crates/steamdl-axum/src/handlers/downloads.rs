//! Download handlers - submission, lookup, cancellation and logs.

use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use steamdl_core::{Job, JobError, JobId, JobSpec};
use steamdl_download::{Deleted, LogPage};

use crate::dto::{LogsQuery, SubmitDownloadRequest};
use crate::error::HttpError;
use crate::sse;
use crate::state::AppState;

/// Malformed ids name no job.
fn parse_id(raw: &str) -> Result<JobId, HttpError> {
    raw.parse()
        .map_err(|_| HttpError::from(JobError::not_found(raw)))
}

/// Submit a download. Returns `201` with the job as stored after admission.
pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitDownloadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Job>), HttpError> {
    let Json(req) = body?;
    let job = state.scheduler.submit(JobSpec::from(req)).await?;
    tracing::debug!(
        target: "steamdl.http",
        job_id = %job.id,
        status = %job.status,
        "download submitted"
    );
    Ok((StatusCode::CREATED, Json(job)))
}

/// All jobs in submission order.
pub async fn list(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.scheduler.list().await)
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, HttpError> {
    let id = parse_id(&id)?;
    Ok(Json(state.scheduler.get(&id).await?))
}

/// Cancel a job.
///
/// `200` once the job is terminal; `202` if a running job had not stopped
/// within the cancellation bound.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Job>), HttpError> {
    let id = parse_id(&id)?;
    let job = state.scheduler.cancel(&id).await?;
    let status = if job.is_terminal() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(job)))
}

/// Remove a finished job (`204`) or cancel a live one (`202` + job).
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let id = parse_id(&id)?;
    Ok(match state.scheduler.delete(&id).await? {
        Deleted::Removed(_) => StatusCode::NO_CONTENT.into_response(),
        Deleted::Cancelled(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
    })
}

/// Buffered log lines from `?since=N`.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogPage>, HttpError> {
    let id = parse_id(&id)?;
    let Query(query) = query?;
    Ok(Json(state.scheduler.logs(&id, query.since).await?))
}

/// Live log lines over SSE, starting with the buffered lines from `?since=N`.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, HttpError> {
    let id = parse_id(&id)?;
    let Query(query) = query?;
    let (page, receiver) = state.scheduler.subscribe_logs(&id, query.since).await?;
    Ok(sse::log_lines(page, receiver, state.shutdown.clone()))
}

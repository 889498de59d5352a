//! SSE events handler - job lifecycle streaming.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;

use crate::sse;
use crate::state::AppState;

/// SSE events stream endpoint.
///
/// Each event is named after its `type` (`job_submitted`, `job_started`,
/// `job_cancel_requested`, `job_finished`, `job_deleted`).
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    sse::job_events(state.scheduler.subscribe(), state.shutdown.clone())
}

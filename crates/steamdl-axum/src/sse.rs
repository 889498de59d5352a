//! SSE helpers for job events and live log lines.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use steamdl_core::JobEvent;
use steamdl_download::{LogLine, LogPage};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Keep-alive ping every 30 seconds to prevent proxy timeouts.
fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(30))
        .text("ping")
}

fn json_event<T: Serialize>(name: &'static str, value: &T) -> Option<Event> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            tracing::warn!("Failed to serialize SSE payload: {}", e);
            None
        }
    }
}

fn log_event(line: &LogLine) -> Option<Event> {
    json_event("log", line).map(|event| event.id(line.seq.to_string()))
}

/// End `stream` when `shutdown` is cancelled; graceful shutdown waits for
/// every open connection.
fn until_shutdown<S: Stream>(
    stream: S,
    shutdown: CancellationToken,
) -> impl Stream<Item = S::Item> {
    futures_util::StreamExt::take_until(stream, shutdown.cancelled_owned())
}

/// Stream every job lifecycle event, named by its `type`.
pub fn job_events(
    receiver: broadcast::Receiver<JobEvent>,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let stream = BroadcastStream::new(receiver).filter_map(|result| match result {
        Ok(event) => json_event(event.name(), &event).map(Ok),
        Err(e) => {
            // Lagged clients skip ahead.
            tracing::debug!("SSE stream error: {}", e);
            None
        }
    });
    Sse::new(until_shutdown(stream, shutdown)).keep_alive(keep_alive())
}

/// Replay the buffered page, then follow live lines.
///
/// Live lines the page already covered are skipped.
pub fn log_lines(
    page: LogPage,
    receiver: broadcast::Receiver<LogLine>,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let resume_at = page.next;
    let buffered = stream::iter(page.lines).filter_map(|line| log_event(&line).map(Ok));
    let live = BroadcastStream::new(receiver).filter_map(move |result| match result {
        Ok(line) if line.seq >= resume_at => log_event(&line).map(Ok),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Log stream error: {}", e);
            None
        }
    });
    Sse::new(until_shutdown(buffered.chain(live), shutdown)).keep_alive(keep_alive())
}

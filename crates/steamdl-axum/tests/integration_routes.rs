//! Integration tests for the Axum web server.
//!
//! These tests verify that routes are correctly wired to the scheduler and
//! that errors map to the documented status codes.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use steamdl_axum::{AxumContext, CorsConfig, create_router, serve};
use steamdl_core::{
    CancelReason, CommandPlan, JobCommandPort, JobSpec, JobStatus, LaunchRequest,
    MetricsProbePort, NoopJobStateRepository, OrchestratorConfig, PlanError, ProbeError,
    ResourceMetrics,
};
use steamdl_download::{Scheduler, SchedulerDeps, StatusReporter};

const LONG_RUNNING_APP: u32 = 10;
const CHATTY_APP: u32 = 20;
const LAST_LINE: &str = "process exited with code 0";

/// `exec sleep 30` for [`LONG_RUNNING_APP`], five paced lines for
/// [`CHATTY_APP`], a short echo otherwise.
struct ShellPlanner;

impl JobCommandPort for ShellPlanner {
    fn plan(&self, request: &LaunchRequest<'_>) -> Result<CommandPlan, PlanError> {
        let script = match request.job.target.app_id() {
            LONG_RUNNING_APP => "exec sleep 30",
            CHATTY_APP => "for i in 1 2 3 4 5; do echo line $i; sleep 0.1; done",
            _ => "echo hello from steamcmd",
        };
        Ok(CommandPlan::new("/bin/sh").arg("-c").arg(script))
    }
}

struct FixedProbe;

impl MetricsProbePort for FixedProbe {
    fn sample(&self, _storage_root: &Path) -> Result<ResourceMetrics, ProbeError> {
        Ok(ResourceMetrics {
            cpu_percent: 12.5,
            memory_percent: 50.0,
            memory_used_bytes: 4,
            memory_total_bytes: 8,
            disk_percent: None,
            disk_available_bytes: None,
            disk_total_bytes: None,
        })
    }
}

async fn context(root: &Path) -> AxumContext {
    let config = OrchestratorConfig {
        max_concurrent_downloads: 1,
        job_timeout: None,
        cancel_grace_period: Duration::from_secs(2),
        ..OrchestratorConfig::with_storage_root(root)
    };
    let scheduler = Scheduler::start(SchedulerDeps {
        config,
        planner: Arc::new(ShellPlanner),
        repository: Arc::new(NoopJobStateRepository),
    })
    .await
    .unwrap();
    let reporter = StatusReporter::new(scheduler.clone(), Arc::new(FixedProbe));
    AxumContext::new(scheduler, reporter)
}

async fn setup(root: &Path) -> (Router, Scheduler) {
    let ctx = context(root).await;
    let scheduler = ctx.scheduler.clone();
    (create_router(ctx, &CorsConfig::AllowAll), scheduler)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Open an SSE response and read it until `needle` shows up, returning the
/// event ids in order.
async fn read_event_ids(app: &Router, uri: &str, needle: &str) -> Vec<u64> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let mut text = String::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !text.contains(needle) {
            let frame = body.frame().await.expect("stream ended early").unwrap();
            if let Ok(data) = frame.into_data() {
                text.push_str(std::str::from_utf8(&data).unwrap());
            }
        }
    })
    .await
    .expect("stream never reached the expected event");

    text.lines()
        .filter_map(|line| line.strip_prefix("id:"))
        .map(|id| id.trim().parse().unwrap())
        .collect()
}

async fn wait_log_lines(app: &Router, id: &str, count: usize) {
    for _ in 0..500 {
        let (_, page) = send_json(app, "GET", &format!("/api/downloads/{id}/logs"), None).await;
        if page["lines"].as_array().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never logged {count} lines");
}

async fn wait_terminal(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let (_, job) = send_json(app, "GET", &format!("/api/downloads/{id}"), None).await;
        if matches!(job["status"].as_str(), Some("succeeded" | "failed" | "cancelled")) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} never finished");
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn submit_returns_created_job() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (status, job) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": 740, "validate": true, "platform": "windows" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["target"], 740);
    assert_eq!(job["options"]["validate"], true);
    assert_eq!(job["options"]["platform"], "windows");
    assert_eq!(job["credential"]["mode"], "anonymous");

    let id = job["id"].as_str().unwrap();
    let done = wait_terminal(&app, id).await;
    assert_eq!(done["status"], "succeeded");
    assert_eq!(done["exit_code"], 0);

    let (status, list) = send_json(&app, "GET", "/api/downloads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn store_url_submission_keeps_the_url() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;
    let url = "https://store.steampowered.com/app/740/CSGO_Server/";

    let (status, job) = send_json(&app, "POST", "/api/downloads", Some(json!({ "target": url }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["target"], 740);
    assert_eq!(job["requested_target"], url);

    let id = job["id"].as_str().unwrap();
    let (_, fetched) = send_json(&app, "GET", &format!("/api/downloads/{id}"), None).await;
    assert_eq!(fetched["requested_target"], url);
}

#[tokio::test]
async fn invalid_submission_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (app, scheduler) = setup(dir.path()).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "target": "not-an-app" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "INVALID_SPEC");
    assert_eq!(body["status"], 400);

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": 740, "beta": "+quit" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app, "POST", "/api/downloads", Some(json!({ "app_id": [1] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(scheduler.list().await.is_empty());
}

#[tokio::test]
async fn secrets_are_never_returned() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": 740, "username": "gaben", "password": "hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("gaben"));
    assert!(!text.contains("hunter2"));
}

#[tokio::test]
async fn unknown_or_malformed_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (status, body) = send_json(
        &app,
        "GET",
        "/api/downloads/4b0c1f9e-55e1-4c44-9a3c-1c2b5c1c77aa",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["type"], "NOT_FOUND");

    let (status, _) = send_json(&app, "POST", "/api/downloads/nope/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_finished_job_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, job) = send_json(&app, "POST", "/api/downloads", Some(json!({ "app_id": 740 }))).await;
    let id = job["id"].as_str().unwrap();
    wait_terminal(&app, id).await;

    let (status, body) = send_json(&app, "POST", &format!("/api/downloads/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], "CONFLICT");
}

#[tokio::test]
async fn cancel_running_job_returns_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, job) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": LONG_RUNNING_APP })),
    )
    .await;
    assert_eq!(job["status"], "running");
    let id = job["id"].as_str().unwrap();

    let (status, job) = send_json(&app, "POST", &format!("/api/downloads/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "cancelled");
    assert_eq!(job["cancel_reason"], "requested");
}

#[tokio::test]
async fn delete_removes_finished_and_cancels_live() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, finished) =
        send_json(&app, "POST", "/api/downloads", Some(json!({ "app_id": 740 }))).await;
    let finished_id = finished["id"].as_str().unwrap();
    wait_terminal(&app, finished_id).await;

    let (status, body) = send(&app, "DELETE", &format!("/api/downloads/{finished_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    let (status, _) = send_json(&app, "GET", &format!("/api/downloads/{finished_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, live) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": LONG_RUNNING_APP })),
    )
    .await;
    let live_id = live["id"].as_str().unwrap();
    let (status, job) = send_json(&app, "DELETE", &format!("/api/downloads/{live_id}"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(job["status"], "cancelled");
}

#[tokio::test]
async fn logs_page_from_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, job) = send_json(&app, "POST", "/api/downloads", Some(json!({ "app_id": 740 }))).await;
    let id = job["id"].as_str().unwrap();
    wait_terminal(&app, id).await;

    let (status, page) = send_json(&app, "GET", &format!("/api/downloads/{id}/logs"), None).await;
    assert_eq!(status, StatusCode::OK);
    let lines = page["lines"].as_array().unwrap();
    assert!(lines
        .iter()
        .any(|l| l["line"] == "hello from steamcmd" && l["stream"] == "stdout"));

    let next = page["next"].as_u64().unwrap();
    let (_, tail) = send_json(
        &app,
        "GET",
        &format!("/api/downloads/{id}/logs?since={next}"),
        None,
    )
    .await;
    assert!(tail["lines"].as_array().unwrap().is_empty());
    assert_eq!(tail["next"], next);

    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/downloads/{id}/logs?since=abc"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn system_snapshot_reports_capacity_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (status, snapshot) = send_json(&app, "GET", "/api/system", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["capacity"], 1);
    assert_eq!(snapshot["free_slots"], 1);
    assert_eq!(snapshot["jobs"]["queued"], 0);
    assert_eq!(snapshot["resources"]["cpu_percent"], 12.5);
}

#[tokio::test]
async fn events_endpoint_returns_sse_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn submit_after_shutdown_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, scheduler) = setup(dir.path()).await;
    scheduler.shutdown().await;

    let (status, body) =
        send_json(&app, "POST", "/api/downloads", Some(json!({ "app_id": 740 }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["type"], "SHUTTING_DOWN");
}

#[tokio::test]
async fn log_stream_replays_buffer_then_follows_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, job) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": CHATTY_APP })),
    )
    .await;
    let id = job["id"].as_str().unwrap();

    // Command line plus the first two echoes, so both cursors start inside
    // the buffer while the job is still printing.
    wait_log_lines(&app, id, 3).await;
    let start_uri = format!("/api/downloads/{id}/logs/stream?since=0");
    let cursor_uri = format!("/api/downloads/{id}/logs/stream?since=2");
    let (from_start, from_cursor) = tokio::join!(
        read_event_ids(&app, &start_uri, LAST_LINE),
        read_event_ids(&app, &cursor_uri, LAST_LINE),
    );

    let done = wait_terminal(&app, id).await;
    assert_eq!(done["status"], "succeeded");
    let (_, page) = send_json(&app, "GET", &format!("/api/downloads/{id}/logs"), None).await;
    let next = page["next"].as_u64().unwrap();

    assert_eq!(from_start, (0..next).collect::<Vec<_>>());
    assert_eq!(from_cursor, (2..next).collect::<Vec<_>>());
}

#[tokio::test]
async fn log_stream_of_finished_job_replays_from_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = setup(dir.path()).await;

    let (_, job) = send_json(
        &app,
        "POST",
        "/api/downloads",
        Some(json!({ "app_id": CHATTY_APP })),
    )
    .await;
    let id = job["id"].as_str().unwrap();
    wait_terminal(&app, id).await;

    let (_, page) = send_json(&app, "GET", &format!("/api/downloads/{id}/logs"), None).await;
    let next = page["next"].as_u64().unwrap();
    let cursor = next - 2;

    let ids = read_event_ids(
        &app,
        &format!("/api/downloads/{id}/logs/stream?since={cursor}"),
        LAST_LINE,
    )
    .await;
    assert_eq!(ids, vec![cursor, cursor + 1]);
}

#[tokio::test]
async fn shutdown_stops_jobs_while_an_event_stream_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path()).await;
    let scheduler = ctx.scheduler.clone();
    let job = scheduler
        .submit(JobSpec::anonymous(LONG_RUNNING_APP.to_string()))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Running);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn({
        let cancel = cancel.clone();
        async move { serve(listener, ctx, &CorsConfig::AllowAll, cancel).await }
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /api/events HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !String::from_utf8_lossy(&received).contains("200 OK") {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the response head");
            received.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("event stream never answered");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(15), server)
        .await
        .expect("graceful shutdown hung with an event stream open")
        .unwrap()
        .unwrap();

    // The stream ended, so the connection is closed.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await
    .expect("event stream stayed open after shutdown");

    let job = scheduler.get(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.cancel_reason, Some(CancelReason::Shutdown));
}

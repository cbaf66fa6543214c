//! Integration tests for the HTTP API.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use hush_server::{
    handlers::{CreateResponse, LoadResponse, ParamsResponse},
    store::crypto::{Codec, CodecParams, ServerKey},
    store::MemoryStore,
    timing::TimingGuard,
    AppState, Messager, MessagerConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

const FLOOR: Duration = Duration::from_millis(50);

/// Build a router over an in-memory store with cheap Argon2 parameters.
fn create_app() -> Router {
    let codec = Codec::new(ServerKey::generate(), CodecParams::insecure_fast()).unwrap();
    let cfg = MessagerConfig {
        pin_size: 4,
        max_pin_attempts: 3,
        max_expire: Duration::from_secs(600),
    };
    let messager = Messager::new(Arc::new(MemoryStore::new()), codec, cfg).unwrap();
    let state = AppState {
        messager: Arc::new(messager),
        guard: TimingGuard::new(FLOOR),
    };
    hush_server::router(state, 64 * 1024, Duration::from_secs(10))
}

/// Helper to get response body as bytes.
async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn post_message(app: &Router, body: Value) -> (StatusCode, Vec<u8>) {
    let body = body.to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/message")
                .header("content-type", "application/json")
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_bytes(response.into_body()).await)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_bytes(response.into_body()).await)
}

async fn make(app: &Router, message: &str, pin: &str) -> CreateResponse {
    let (status, body) = post_message(app, json!({"message": message, "exp": 60, "pin": pin})).await;
    assert_eq!(status, StatusCode::CREATED);
    serde_json::from_slice(&body).unwrap()
}

/// Log sink shared with a thread-local fmt subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Capture everything at debug and above on the current thread.
fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

fn error_kind(body: &[u8]) -> String {
    let v: Value = serde_json::from_slice(body).unwrap();
    v["kind"].as_str().unwrap_or_default().to_owned()
}

// ========== Create ==========

#[tokio::test]
async fn test_create_returns_key_and_expiry() {
    let app = create_app();
    let created = make(&app, "hello", "1234").await;
    assert_eq!(created.key.len(), 32);
    assert!(created.exp > 0);
}

#[tokio::test]
async fn test_create_rejects_bad_pin_size() {
    let app = create_app();
    let (status, body) =
        post_message(&app, json!({"message": "hello", "exp": 60, "pin": "12"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "validation");
}

#[tokio::test]
async fn test_create_rejects_long_ttl() {
    let app = create_app();
    let (status, _) =
        post_message(&app, json!({"message": "hello", "exp": 601, "pin": "1234"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_rejects_malformed_json() {
    let app = create_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/message")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_rejects_oversized_body() {
    let app = create_app();
    let big = "x".repeat(70 * 1024);
    let (status, _) = post_message(&app, json!({"message": big, "exp": 60, "pin": "1234"})).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_create_rejection_does_not_log_pin() {
    let app = create_app();
    let (logs, _guard) = capture_logs();
    let (status, body) =
        post_message(&app, json!({"message": "hi", "exp": 60, "pin": 9731})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "validation");
    assert!(!String::from_utf8_lossy(&body).contains("9731"));

    let text = logs.text();
    assert!(text.contains("can't bind create request"));
    assert!(!text.contains("9731"), "pin leaked into logs: {text}");
}

// ========== Load ==========

#[tokio::test]
async fn test_load_once_then_not_found() {
    let app = create_app();
    let created = make(&app, "hello", "1234").await;
    let uri = format!("/api/v1/message/{}/1234", created.key);

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let loaded: LoadResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(loaded.key, created.key);
    assert_eq!(loaded.message, "hello");

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_kind(&body), "not_found");
}

#[tokio::test]
async fn test_wrong_pin_then_lockout() {
    let app = create_app();
    let created = make(&app, "hello", "1234").await;
    let wrong = format!("/api/v1/message/{}/0000", created.key);

    let (status, body) = get(&app, &wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "bad_pin");

    let (status, _) = get(&app, &wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = get(&app, &wrong).await;
    assert_eq!(status, StatusCode::EXPECTATION_FAILED);
    assert_eq!(error_kind(&body), "attempts_exhausted");

    let (status, _) = get(&app, &format!("/api/v1/message/{}/1234", created.key)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_load_bad_pin_size_is_padded() {
    let app = create_app();
    let started = Instant::now();
    let (status, body) = get(&app, "/api/v1/message/abcdef/12").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "validation");
    assert!(started.elapsed() >= FLOOR);
}

#[tokio::test]
async fn test_load_missing_key_is_padded() {
    let app = create_app();
    let started = Instant::now();
    let (status, _) = get(&app, "/api/v1/message/abcdef/1234").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(started.elapsed() >= FLOOR);
}

#[tokio::test]
async fn test_request_span_omits_pin() {
    let app = create_app();
    let (logs, _guard) = capture_logs();
    let (status, _) = get(&app, "/api/v1/message/abcdef/8642").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let text = logs.text();
    assert!(text.contains("finished processing request"));
    assert!(text.contains("/api/v1/message/{key}/{pin}"));
    assert!(!text.contains("8642"), "pin leaked into logs: {text}");
}

#[tokio::test]
async fn test_slow_read_times_out_with_408() {
    let codec = Codec::new(ServerKey::generate(), CodecParams::insecure_fast()).unwrap();
    let messager = Messager::new(Arc::new(MemoryStore::new()), codec, MessagerConfig::default())
        .unwrap();
    let state = AppState {
        messager: Arc::new(messager),
        guard: TimingGuard::new(Duration::from_secs(2)),
    };
    let app = hush_server::router(state, 64 * 1024, Duration::from_millis(100));

    let (status, _) = get(&app, "/api/v1/message/abcdef/12345").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

// ========== Misc ==========

#[tokio::test]
async fn test_params() {
    let app = create_app();
    let (status, body) = get(&app, "/api/v1/params").await;
    assert_eq!(status, StatusCode::OK);
    let params: ParamsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(params.pin_size, 4);
    assert_eq!(params.max_pin_attempts, 3);
    assert_eq!(params.max_exp_sec, 600);
}

#[tokio::test]
async fn test_ping_and_robots() {
    let app = create_app();
    let (status, body) = get(&app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");

    let (status, body) = get(&app, "/robots.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Disallow: /api/"));
}

#[tokio::test]
async fn test_unknown_api_path_is_json_404() {
    let app = create_app();
    let (status, body) = get(&app, "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"], "not found");

    let (status, _) = get(&app, "/elsewhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

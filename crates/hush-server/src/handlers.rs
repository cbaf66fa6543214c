use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::{error::MessageError, timing::load_guarded, AppState};

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateRequest {
    pub message: String,
    /// TTL in seconds.
    pub exp: u64,
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub key: String,
    /// Unix timestamp (seconds).
    pub exp: i64,
}

pub async fn create_message(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            // The rejection text can quote field values, including the PIN.
            warn!(status = %rejection.status(), "can't bind create request");
            let (status, reason) = match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
                }
                _ => (StatusCode::BAD_REQUEST, "invalid request body"),
            };
            return (status, Json(json!({"error": reason, "kind": "validation"}))).into_response();
        }
    };

    let messager = state.messager.clone();
    let made = tokio::task::spawn_blocking(move || {
        messager.make_message(Duration::from_secs(body.exp), &body.message, &body.pin)
    })
    .await;

    match made {
        Ok(Ok(msg)) => (
            StatusCode::CREATED,
            Json(CreateResponse {
                key: msg.key,
                exp: msg.expires_at,
            }),
        )
            .into_response(),
        Ok(Err(e)) => message_error(e),
        Err(e) => internal_error(anyhow::anyhow!("create task failed: {e}")),
    }
}

// ── Load ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    pub key: String,
    pub message: String,
}

pub async fn load_message(
    State(state): State<AppState>,
    Path((key, pin)): Path<(String, String)>,
) -> Response {
    match load_guarded(state.messager.clone(), state.guard, key, pin).await {
        Ok(loaded) => Json(LoadResponse {
            key: loaded.key,
            message: loaded.message,
        })
        .into_response(),
        Err(e) => message_error(e),
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ParamsResponse {
    pub pin_size: usize,
    pub max_pin_attempts: u32,
    pub max_exp_sec: u64,
}

pub async fn params(State(state): State<AppState>) -> Json<ParamsResponse> {
    let cfg = state.messager.config();
    Json(ParamsResponse {
        pin_size: cfg.pin_size,
        max_pin_attempts: cfg.max_pin_attempts,
        max_exp_sec: cfg.max_expire.as_secs(),
    })
}

// ── Misc ──────────────────────────────────────────────────────────────────────

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn robots() -> &'static str {
    "User-agent: *\nDisallow: /api/\nDisallow: /message/\n"
}

pub async fn not_found(uri: Uri) -> Response {
    if uri.path().starts_with("/api/v1") {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response();
    }
    (StatusCode::NOT_FOUND, "not found").into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Map a messager error onto a status code and a JSON body.
pub fn message_error(e: MessageError) -> Response {
    let status = match e {
        MessageError::Validation(_) => StatusCode::BAD_REQUEST,
        MessageError::NotFound => StatusCode::NOT_FOUND,
        MessageError::BadPin => StatusCode::FORBIDDEN,
        MessageError::AttemptsExhausted => StatusCode::EXPECTATION_FAILED,
        MessageError::DuplicateKey | MessageError::Internal(_) => {
            return internal_error(anyhow::Error::from(e));
        }
    };
    (
        status,
        Json(json!({"error": e.to_string(), "kind": e.kind()})),
    )
        .into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}

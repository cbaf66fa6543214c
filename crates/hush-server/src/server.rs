use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::{Engine, ServerConfig},
    handlers::{create_message, load_message, not_found, params, ping, robots},
    messager::Messager,
    store::{
        crypto::{Codec, ServerKey},
        MemoryStore, MessageStore, RedbStore, SystemClock,
    },
    sweep::spawn_sweep,
    timing::TimingGuard,
    AppState,
};

/// Build the HTTP router around `state`.
pub fn router(state: AppState, max_body_bytes: usize, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/message", post(create_message))
        .route("/message/{key}/{pin}", get(load_message))
        .route("/params", get(params));

    Router::new()
        .nest("/api/v1", api)
        .route("/ping", get(ping))
        .route("/robots.txt", get(robots))
        .fallback(not_found)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Request span carrying the route template rather than the URI, which holds
/// the PIN on reads.
fn request_span(req: &Request) -> tracing::Span {
    let route = req.extensions().get::<MatchedPath>().map(MatchedPath::as_str);
    tracing::debug_span!("request", method = %req.method(), route)
}

/// Open the configured store and the server key that goes with it.
fn open_store(cfg: &ServerConfig) -> Result<(Arc<dyn MessageStore>, ServerKey)> {
    match cfg.engine {
        Engine::Redb => {
            let data_dir = crate::dirs::data_dir(cfg.data_dir.as_deref())?;
            info!(data_dir = %data_dir.display(), "using data directory");
            let key = ServerKey::load_or_create(&data_dir.join("hush.key"))?;
            let store = RedbStore::open(&data_dir.join("hush.db")).context("open store")?;
            Ok((Arc::new(store), key))
        }
        Engine::Memory => {
            // Messages die with the process, so a key file only matters if asked for.
            let key = match cfg.data_dir.as_deref() {
                Some(dir) => {
                    let dir = crate::dirs::data_dir(Some(dir))?;
                    ServerKey::load_or_create(&dir.join("hush.key"))?
                }
                None => ServerKey::generate(),
            };
            Ok((Arc::new(MemoryStore::new()), key))
        }
    }
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    cfg.messager.validate().context("invalid messager config")?;

    let (store, server_key) = open_store(&cfg)?;
    let codec = Codec::new(server_key, cfg.codec)?;
    let messager = Arc::new(Messager::new(store.clone(), codec, cfg.messager.clone())?);

    spawn_sweep(store, Arc::new(SystemClock), cfg.sweep_interval);

    info!(
        engine = ?cfg.engine,
        pin_size = cfg.messager.pin_size,
        max_pin_attempts = cfg.messager.max_pin_attempts,
        max_expire_secs = cfg.messager.max_expire.as_secs(),
        timing_floor_ms = cfg.timing_floor.as_millis() as u64,
        "messager ready"
    );

    let state = AppState {
        messager,
        guard: TimingGuard::new(cfg.timing_floor),
    };
    let app = router(state, cfg.max_body_bytes, cfg.request_timeout);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "hush server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "can't listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

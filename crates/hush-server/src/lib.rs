pub mod config;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod messager;
pub mod server;
pub mod store;
pub mod sweep;
pub mod timing;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub messager: Arc<messager::Messager>,
    /// Pads every retrieval response to a fixed minimum latency.
    pub guard: timing::TimingGuard,
}

pub use config::{Engine, MessagerConfig, ServerConfig};
pub use error::MessageError;
pub use messager::{LoadedMessage, Messager, NewMessage};
pub use server::{router, run};

//! Latency padding for retrieval.
//!
//! A missing key answers in microseconds; a wrong PIN costs a full Argon2
//! derivation. Padding every response up to a fixed floor hides which branch
//! ran. Only the minimum is enforced: an operation that overruns the floor
//! returns as soon as it finishes.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::MessageError;
use crate::messager::{LoadedMessage, Messager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingGuard {
    floor: Duration,
}

impl TimingGuard {
    pub fn new(floor: Duration) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Await `fut`, then sleep off whatever is left of the floor.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let started = Instant::now();
        let out = fut.await;
        if let Some(rest) = self.remaining(started) {
            tokio::time::sleep(rest).await;
        }
        out
    }

    /// Blocking flavour of [`TimingGuard::run`] for callers off the runtime.
    pub fn run_blocking<T>(&self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        if let Some(rest) = self.remaining(started) {
            std::thread::sleep(rest);
        }
        out
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.floor
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
    }
}

/// `load_message` as served to the network: run on the blocking pool and
/// padded to the guard's floor.
///
/// The blocking task is detached from the caller. If the request future is
/// dropped mid-flight the load still runs to completion, so the store never
/// sees half of an attempt.
pub async fn load_guarded(
    messager: Arc<Messager>,
    guard: TimingGuard,
    key: String,
    pin: String,
) -> Result<LoadedMessage, MessageError> {
    guard
        .run(async move {
            match tokio::task::spawn_blocking(move || messager.load_message(&key, &pin)).await {
                Ok(res) => res,
                Err(e) => Err(MessageError::Internal(anyhow::anyhow!("load task failed: {e}"))),
            }
        })
        .await
}

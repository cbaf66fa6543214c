use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use crate::store::{Clock, MessageStore};

/// Remove every message that is past its expiry.
pub fn sweep_once(store: &dyn MessageStore, clock: &dyn Clock) -> Result<usize> {
    let removed = store.sweep(clock.now())?;
    if removed > 0 {
        info!(removed, "swept expired messages");
    }
    Ok(removed)
}

/// Spawn a background Tokio task that sweeps every `interval`.
pub fn spawn_sweep(
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            ticker.tick().await;
            let store = store.clone();
            let clock = clock.clone();
            let res =
                tokio::task::spawn_blocking(move || sweep_once(store.as_ref(), clock.as_ref()))
                    .await;
            match res {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "background sweep error"),
                Err(e) => warn!(error = %e, "background sweep task failed"),
            }
        }
    })
}

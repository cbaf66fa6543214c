use anyhow::Result;
use tracing::debug;

use crate::store::{AttemptResult, MessageStore};

/// What a failed PIN check did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Record still live; this many tries are left.
    Retry { remaining: u32 },
    /// That was the last allowed try. The record has been destroyed.
    Exhausted,
    /// The record vanished before the attempt could be counted.
    Gone,
}

/// Wrong-PIN policy on top of the store's atomic counter.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLimiter {
    max_attempts: u32,
}

impl AttemptLimiter {
    pub fn new(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            anyhow::bail!("max attempts must be at least 1");
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Consume one attempt against `key`.
    pub fn record_failure(&self, store: &dyn MessageStore, key: &str) -> Result<Verdict> {
        let verdict = match store.increment_attempts(key, self.max_attempts)? {
            AttemptResult::Counted(used) => Verdict::Retry {
                remaining: self.max_attempts.saturating_sub(used),
            },
            AttemptResult::LockedOut => Verdict::Exhausted,
            AttemptResult::NotFound => Verdict::Gone,
        };
        debug!(key, ?verdict, "wrong pin attempt");
        Ok(verdict)
    }
}

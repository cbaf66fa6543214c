use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{AttemptResult, MessageStore, PutResult, SecretRecord};

/// In-process engine. `DashMap` shards its locks, and each entry operation
/// holds the shard lock for the whole read-modify-write, which gives per-key
/// atomicity without a global lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, SecretRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStore {
    fn put(&self, record: &SecretRecord) -> Result<PutResult> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(PutResult::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                debug!(key = %record.key, "stored message");
                Ok(PutResult::Stored)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    fn increment_attempts(&self, key: &str, max_attempts: u32) -> Result<AttemptResult> {
        match self.records.entry(key.to_owned()) {
            Entry::Vacant(_) => Ok(AttemptResult::NotFound),
            Entry::Occupied(mut slot) => {
                let used = slot.get().attempts_used.saturating_add(1);
                if used >= max_attempts {
                    slot.remove();
                    debug!(key, "locked out after final attempt");
                    Ok(AttemptResult::LockedOut)
                } else {
                    slot.get_mut().attempts_used = used;
                    Ok(AttemptResult::Counted(used))
                }
            }
        }
    }

    fn destroy(&self, key: &str) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }

    fn sweep(&self, now: i64) -> Result<usize> {
        let mut removed = 0usize;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

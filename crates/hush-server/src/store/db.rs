use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::debug;

use super::{AttemptResult, MessageStore, PutResult, SecretRecord};

const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Marker byte prefixed to every encoded record, so a future layout change can
/// be told apart from this one.
const RECORD_V1_MARKER: u8 = 0x01;

/// Durable engine on redb.
///
/// redb admits one write transaction at a time, so every mutation below is a
/// single read-modify-write inside one transaction: nothing can interleave
/// between reading `attempts_used` and writing it back. Readers use MVCC
/// snapshots and never see a half-applied write.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(MESSAGES)?;
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl MessageStore for RedbStore {
    fn put(&self, record: &SecretRecord) -> Result<PutResult> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(MESSAGES)?;
            if table.get(record.key.as_str())?.is_some() {
                PutResult::DuplicateKey
            } else {
                table.insert(record.key.as_str(), bytes.as_slice())?;
                PutResult::Stored
            }
        };
        write_txn.commit()?;

        if result == PutResult::Stored {
            debug!(key = %record.key, "stored message");
        }
        Ok(result)
    }

    fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;
        match table.get(key)? {
            None => Ok(None),
            Some(guard) => decode(guard.value()).map(Some),
        }
    }

    fn increment_attempts(&self, key: &str, max_attempts: u32) -> Result<AttemptResult> {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(MESSAGES)?;

            // Copy out so the AccessGuard (which borrows `table`) is gone before mutation.
            let raw_bytes: Option<Vec<u8>> = table.get(key)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => AttemptResult::NotFound,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    let used = record.attempts_used.saturating_add(1);
                    if used >= max_attempts {
                        table.remove(key)?;
                        debug!(key, "locked out after final attempt");
                        AttemptResult::LockedOut
                    } else {
                        record.attempts_used = used;
                        let updated = encode(&record)?;
                        table.insert(key, updated.as_slice())?;
                        AttemptResult::Counted(used)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    fn destroy(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(MESSAGES)?;
            let removed = table.remove(key)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn sweep(&self, now: i64) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(MESSAGES)?;

            let mut expired = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                if decode(v.value())?.is_expired(now) {
                    expired.push(k.value().to_owned());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;
        Ok(table.len()? as usize)
    }
}

fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_V1_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    match bytes.split_first() {
        Some((&RECORD_V1_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record marker {marker:#04x}"),
        None => anyhow::bail!("empty record"),
    }
}

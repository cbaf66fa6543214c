pub mod crypto;
pub mod db;
pub mod memory;
pub mod model;

use anyhow::Result;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{Clock, ManualClock, SecretRecord, SystemClock};

/// Outcome of inserting a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    Stored,
    /// A live record already holds this key. Nothing was written.
    DuplicateKey,
}

/// Outcome of consuming one PIN attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// Attempt recorded; the record is still live with this many attempts used.
    Counted(u32),
    /// This attempt reached the limit and the record was destroyed in the same step.
    LockedOut,
    /// No such record (never existed, already destroyed, or swept).
    NotFound,
}

/// Keyed storage for secret records.
///
/// Every mutation of a single key is atomic with respect to every other
/// mutation of that key. Operations on different keys do not block each
/// other beyond what the backend itself imposes.
pub trait MessageStore: Send + Sync {
    /// Insert a new record. Never overwrites.
    fn put(&self, record: &SecretRecord) -> Result<PutResult>;

    /// Fetch a record without mutating it.
    fn get(&self, key: &str) -> Result<Option<SecretRecord>>;

    /// Atomically bump `attempts_used`; the bump that reaches `max_attempts`
    /// removes the record before anyone else can observe it.
    fn increment_attempts(&self, key: &str, max_attempts: u32) -> Result<AttemptResult>;

    /// Remove a record. Returns true only for the call that actually removed it.
    fn destroy(&self, key: &str) -> Result<bool>;

    /// Remove every record with `expires_at <= now`. Returns the count removed.
    fn sweep(&self, now: i64) -> Result<usize>;

    /// Number of records currently held, expired-but-unswept included.
    fn count(&self) -> Result<usize>;
}

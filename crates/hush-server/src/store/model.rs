use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// One stored secret message.
///
/// `ciphertext` is ChaCha20Poly1305 output keyed from the PIN, so the store
/// never holds anything that decrypts without it. `pin_credential` is a
/// one-way value derived alongside the encryption key and is the only thing
/// the PIN is checked against. Expiry and attempt metadata stay plaintext so
/// the sweep can evict without touching crypto.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    #[zeroize(skip)]
    pub key: String,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    /// Per-record Argon2id salt.
    pub salt: [u8; 16],
    pub pin_credential: [u8; 32],
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    /// Unix timestamp (seconds) at or after which the record is dead.
    pub expires_at: i64,
    /// Wrong-PIN attempts consumed so far.
    pub attempts_used: u32,
}

impl SecretRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

// Hand-written so crypto material never reaches a log line.
impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("attempts_used", &self.attempts_used)
            .finish_non_exhaustive()
    }
}

/// Source of "now" in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Clock that only moves when told to. Used by tests and tooling.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

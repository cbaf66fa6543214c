//! Error kinds surfaced by the messager.

use thiserror::Error;

/// Everything `make_message` / `load_message` can fail with.
///
/// Messages are deliberately terse. None of them name the PIN, the payload,
/// or whether a key ever existed.
#[derive(Error, Debug)]
pub enum MessageError {
    /// Malformed input (PIN length, TTL bounds, empty message). No record was touched.
    #[error("{0}")]
    Validation(String),

    /// Key absent, already read, locked out, or expired.
    #[error("message not found")]
    NotFound,

    /// PIN mismatch; the record is still live.
    #[error("wrong pin")]
    BadPin,

    /// PIN mismatch on the last allowed attempt; the record is gone.
    #[error("wrong pin, attempts exhausted")]
    AttemptsExhausted,

    /// Could not find an unused key within the retry budget.
    #[error("key collision, retries exhausted")]
    DuplicateKey,

    /// Store or codec failure unrelated to the caller's input.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MessageError {
    /// Short machine-readable tag, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::BadPin => "bad_pin",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::DuplicateKey => "duplicate_key",
            Self::Internal(_) => "internal",
        }
    }
}

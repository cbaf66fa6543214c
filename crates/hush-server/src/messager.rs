//! Creation and one-time retrieval of PIN-protected messages.
//!
//! [`Messager`] is the only thing the HTTP layer talks to. It owns the rules:
//! PIN and TTL validation, key generation, the wrong-PIN budget and the
//! destroy-on-read guarantee. Storage, crypto and the attempt counter are
//! delegated to [`MessageStore`], [`Codec`] and [`AttemptLimiter`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MessagerConfig;
use crate::error::MessageError;
use crate::limiter::{AttemptLimiter, Verdict};
use crate::store::crypto::{BadPin, Codec};
use crate::store::{Clock, MessageStore, PutResult, SecretRecord, SystemClock};

/// How many fresh keys to try before giving up on a collision streak.
pub const MAX_KEY_ATTEMPTS: usize = 5;

type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Returned from [`Messager::make_message`]. Never carries the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub key: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

/// Returned from a successful [`Messager::load_message`].
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedMessage {
    pub key: String,
    pub message: String,
}

impl std::fmt::Debug for LoadedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedMessage")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// 128 random bits, hex encoded.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct Messager {
    store: Arc<dyn MessageStore>,
    codec: Codec,
    limiter: AttemptLimiter,
    config: MessagerConfig,
    clock: Arc<dyn Clock>,
    keygen: KeyGenerator,
}

impl Messager {
    pub fn new(
        store: Arc<dyn MessageStore>,
        codec: Codec,
        config: MessagerConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            codec,
            limiter: AttemptLimiter::new(config.max_pin_attempts)?,
            config,
            clock: Arc::new(SystemClock),
            keygen: Arc::new(generate_key),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_generator(
        mut self,
        keygen: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.keygen = Arc::new(keygen);
        self
    }

    pub fn config(&self) -> &MessagerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Encrypt `message` under `pin` and store it for `ttl`.
    pub fn make_message(
        &self,
        ttl: Duration,
        message: &str,
        pin: &str,
    ) -> Result<NewMessage, MessageError> {
        self.check_pin_size(pin)?;
        if ttl.as_secs() == 0 || ttl > self.config.max_expire {
            return Err(MessageError::Validation(format!(
                "expiration must be between 1 and {} seconds",
                self.config.max_expire.as_secs()
            )));
        }
        if message.is_empty() {
            return Err(MessageError::Validation("empty message".into()));
        }

        let sealed = self
            .codec
            .seal(message.as_bytes(), pin)
            .context("seal message")?;
        let now = self.clock.now();
        let expires_at = now.saturating_add(ttl.as_secs() as i64);

        let mut record = SecretRecord {
            key: String::new(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            salt: sealed.salt,
            pin_credential: sealed.pin_credential,
            created_at: now,
            expires_at,
            attempts_used: 0,
        };

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            record.key = (self.keygen)();
            match self.store.put(&record)? {
                PutResult::Stored => {
                    info!(key = %record.key, expires_at, "message created");
                    return Ok(NewMessage {
                        key: record.key.clone(),
                        expires_at,
                    });
                }
                PutResult::DuplicateKey => {
                    warn!(attempt, "generated key already in use, retrying");
                }
            }
        }
        Err(MessageError::DuplicateKey)
    }

    /// Read and destroy the message at `key`, if `pin` opens it.
    ///
    /// Outcomes: the message (record destroyed), `BadPin` (one attempt
    /// consumed, record live), `AttemptsExhausted` (last attempt consumed,
    /// record destroyed), or `NotFound` (missing, expired, or lost a race to
    /// another reader). Callers facing the network should go through
    /// [`crate::timing::load_guarded`].
    pub fn load_message(&self, key: &str, pin: &str) -> Result<LoadedMessage, MessageError> {
        self.check_pin_size(pin)?;
        if key.is_empty() {
            return Err(MessageError::Validation("no key passed".into()));
        }

        let Some(record) = self.store.get(key)? else {
            debug!(key, "message not found");
            return Err(MessageError::NotFound);
        };

        if record.is_expired(self.clock.now()) {
            self.store.destroy(key)?;
            info!(key, "expired message destroyed on read");
            return Err(MessageError::NotFound);
        }

        let opened = self.codec.open(
            &record.ciphertext,
            &record.nonce,
            &record.salt,
            &record.pin_credential,
            pin,
        );

        match opened {
            Ok(plaintext) => {
                // Only the caller that actually removes the record gets to return it.
                if !self.store.destroy(key)? {
                    debug!(key, "message destroyed by a concurrent request");
                    return Err(MessageError::NotFound);
                }
                info!(key, "message read and destroyed");
                let message = String::from_utf8(plaintext).context("message is not utf-8")?;
                Ok(LoadedMessage {
                    key: key.to_owned(),
                    message,
                })
            }
            Err(BadPin) => match self.limiter.record_failure(self.store.as_ref(), key)? {
                Verdict::Retry { remaining } => {
                    warn!(key, remaining, "wrong pin");
                    Err(MessageError::BadPin)
                }
                Verdict::Exhausted => {
                    warn!(key, "wrong pin, attempts exhausted, message destroyed");
                    Err(MessageError::AttemptsExhausted)
                }
                Verdict::Gone => Err(MessageError::NotFound),
            },
        }
    }

    fn check_pin_size(&self, pin: &str) -> Result<(), MessageError> {
        if pin.chars().count() != self.config.pin_size {
            return Err(MessageError::Validation("incorrect pin size".into()));
        }
        Ok(())
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use constant_time_eq::constant_time_eq_32;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

const ENC_LABEL: &[u8] = b"hush/v1/encrypt";
const VERIFY_LABEL: &[u8] = b"hush/v1/verify";

/// 32-byte server-side key mixed into every PIN derivation.
/// Lives in `hush.key` in the data directory.
#[derive(Clone, ZeroizeOnDrop)]
pub struct ServerKey([u8; 32]);

impl ServerKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Load a key from raw bytes (must be exactly 32).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Read `path`, or create it with fresh random bytes if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read key file: {}", path.display()))?;
            Self::from_bytes(&bytes).ok_or_else(|| {
                anyhow::anyhow!(
                    "{} is corrupt (expected 32 bytes, got {})",
                    path.display(),
                    bytes.len()
                )
            })
        } else {
            let key = Self::generate();
            std::fs::write(path, key.as_bytes())
                .with_context(|| format!("write key file: {}", path.display()))?;
            info!(path = %path.display(), "generated new server key");
            Ok(key)
        }
    }
}

/// Argon2id cost for PIN stretching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl CodecParams {
    /// Cheapest parameters Argon2 accepts. For tests only.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost_kib: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// Output of [`Codec::seal`]: everything a record needs to be opened later.
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    pub salt: [u8; 16],
    pub pin_credential: [u8; 32],
}

/// Why [`Codec::open`] refused. Carries no detail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadPin;

/// Per-PIN key material. Both halves are HMAC-SHA256 of the Argon2id output
/// under the server key, with distinct labels, so the stored credential says
/// nothing about the encryption key.
#[derive(ZeroizeOnDrop)]
struct PinKeys {
    encryption: [u8; 32],
    credential: [u8; 32],
}

/// Encrypts payloads under a PIN-derived key and verifies PINs against a
/// stored credential. The PIN itself is never kept.
#[derive(Clone)]
pub struct Codec {
    server_key: ServerKey,
    argon2: Argon2<'static>,
}

impl Codec {
    pub fn new(server_key: ServerKey, params: CodecParams) -> Result<Self> {
        let params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(32))
            .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
        Ok(Self {
            server_key,
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Encrypt `plaintext` under a fresh salt and nonce.
    pub fn seal(&self, plaintext: &[u8], pin: &str) -> Result<Sealed> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let keys = self.derive(pin, &salt)?;

        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&keys.encryption));
        let ciphertext = cipher
            .encrypt(&Nonce::from(nonce), plaintext)
            .map_err(|e| anyhow::anyhow!("encrypt: {e}"))?;

        Ok(Sealed {
            ciphertext,
            nonce,
            salt,
            pin_credential: keys.credential,
        })
    }

    /// Check `pin` against `pin_credential` in constant time, then decrypt.
    /// A credential mismatch and a failed AEAD tag both come back as `BadPin`.
    pub fn open(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; 12],
        salt: &[u8; 16],
        pin_credential: &[u8; 32],
        pin: &str,
    ) -> Result<Vec<u8>, BadPin> {
        let keys = self.derive(pin, salt).map_err(|_| BadPin)?;
        if !constant_time_eq_32(&keys.credential, pin_credential) {
            return Err(BadPin);
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&keys.encryption));
        cipher
            .decrypt(&Nonce::from(*nonce), ciphertext)
            .map_err(|_| BadPin)
    }

    fn derive(&self, pin: &str, salt: &[u8; 16]) -> Result<PinKeys> {
        let mut stretched = [0u8; 32];
        self.argon2
            .hash_password_into(pin.as_bytes(), salt, &mut stretched)
            .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))?;

        let keys = PinKeys {
            encryption: self.label(&stretched, ENC_LABEL)?,
            credential: self.label(&stretched, VERIFY_LABEL)?,
        };
        stretched.zeroize();
        Ok(keys)
    }

    fn label(&self, stretched: &[u8; 32], label: &[u8]) -> Result<[u8; 32]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.server_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("hmac key: {e}"))?;
        mac.update(label);
        mac.update(stretched);
        Ok(mac.finalize().into_bytes().into())
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::store::crypto::CodecParams;

/// Limits enforced by the messager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagerConfig {
    /// Exact PIN length, in characters.
    pub pin_size: usize,
    /// Wrong-PIN attempts allowed before the message is destroyed.
    pub max_pin_attempts: u32,
    /// Longest TTL a sender may ask for.
    pub max_expire: Duration,
}

impl Default for MessagerConfig {
    fn default() -> Self {
        Self {
            pin_size: 5,
            max_pin_attempts: 3,
            max_expire: Duration::from_secs(86400),
        }
    }
}

impl MessagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pin_size == 0 {
            anyhow::bail!("pin size must be at least 1");
        }
        if self.max_pin_attempts == 0 {
            anyhow::bail!("max pin attempts must be at least 1");
        }
        if self.max_expire.is_zero() {
            anyhow::bail!("max expire must be positive");
        }
        Ok(())
    }
}

/// Which storage engine backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Memory,
    Redb,
}

impl std::str::FromStr for Engine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "redb" | "file" => Ok(Self::Redb),
            other => anyhow::bail!("unknown engine '{other}' (expected memory or redb)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub engine: Engine,
    pub data_dir: Option<PathBuf>,
    pub messager: MessagerConfig,
    pub codec: CodecParams,
    /// Minimum latency of every retrieval response.
    pub timing_floor: Duration,
    pub sweep_interval: Duration,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = MessagerConfig::default();
        Self {
            host: std::env::var("HUSH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("HUSH_PORT").unwrap_or(8080),
            engine: env_parse("HUSH_ENGINE").unwrap_or(Engine::Memory),
            data_dir: std::env::var("HUSH_DATA_DIR").ok().map(PathBuf::from),
            messager: MessagerConfig {
                pin_size: env_parse("HUSH_PIN_SIZE").unwrap_or(defaults.pin_size),
                max_pin_attempts: env_parse("HUSH_MAX_PIN_ATTEMPTS")
                    .unwrap_or(defaults.max_pin_attempts),
                max_expire: env_parse("HUSH_MAX_EXPIRE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.max_expire),
            },
            codec: CodecParams::default(),
            timing_floor: Duration::from_millis(env_parse("HUSH_TIMING_FLOOR_MS").unwrap_or(100)),
            sweep_interval: Duration::from_secs(
                env_parse("HUSH_SWEEP_INTERVAL_SECS").unwrap_or(60),
            ),
            max_body_bytes: env_parse("HUSH_MAX_BODY_BYTES").unwrap_or(64 * 1024),
            request_timeout: Duration::from_secs(60),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_messager_config_is_valid() {
        assert!(MessagerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = MessagerConfig::default();
        cfg.max_pin_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MessagerConfig::default();
        cfg.pin_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MessagerConfig::default();
        cfg.max_expire = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn engine_parses() {
        assert_eq!("memory".parse::<Engine>().unwrap(), Engine::Memory);
        assert_eq!("REDB".parse::<Engine>().unwrap(), Engine::Redb);
        assert!("bolt".parse::<Engine>().is_err());
    }
}

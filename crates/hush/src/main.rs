use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hush_server::{store::crypto::CodecParams, Engine, MessagerConfig, ServerConfig};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hush", about = "hush: PIN-protected, read-once secret messages", version)]
struct Cli {
    /// hush server URL (default: http://localhost:8080 or $HUSH_SERVER)
    #[arg(long, env = "HUSH_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hush HTTP server
    Serve(ServeArgs),
    /// Store a message and print its key
    Send {
        /// Message text
        message: String,
        /// PIN the reader must supply
        #[arg(long)]
        pin: String,
        /// Time to live, e.g. 90s, 15m, 2h, 1d
        #[arg(long, default_value = "15m")]
        ttl: String,
        /// Public base URL used to print a share link
        #[arg(long, env = "HUSH_DOMAIN")]
        domain: Option<String>,
    },
    /// Read (and destroy) a message
    Read {
        /// Message key
        key: String,
        /// PIN
        #[arg(long)]
        pin: String,
    },
    /// Show the server's PIN size, attempt limit and max TTL
    Params,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "HUSH_PORT", default_value = "8080")]
    port: u16,
    /// Host to bind
    #[arg(long, env = "HUSH_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Storage engine: memory or redb
    #[arg(long, env = "HUSH_ENGINE", default_value = "memory")]
    engine: Engine,
    /// Data directory for hush.db and hush.key
    #[arg(long, env = "HUSH_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Exact PIN length
    #[arg(long, env = "HUSH_PIN_SIZE", default_value = "5")]
    pin_size: usize,
    /// Wrong-PIN attempts before a message is destroyed
    #[arg(long, env = "HUSH_MAX_PIN_ATTEMPTS", default_value = "3")]
    max_pin_attempts: u32,
    /// Longest TTL a sender may request, in seconds
    #[arg(long, env = "HUSH_MAX_EXPIRE_SECS", default_value = "86400")]
    max_expire_secs: u64,
    /// Minimum latency of every read response, in milliseconds
    #[arg(long, env = "HUSH_TIMING_FLOOR_MS", default_value = "100")]
    timing_floor_ms: u64,
    /// Argon2 memory cost in KiB
    #[arg(long, env = "HUSH_ARGON2_MEMORY_KIB")]
    argon2_memory_kib: Option<u32>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUSH_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Send {
            message,
            pin,
            ttl,
            domain,
        } => cmd_send(&cli.server, &message, &pin, &ttl, domain.as_deref()).await,
        Commands::Read { key, pin } => cmd_read(&cli.server, &key, &pin).await,
        Commands::Params => cmd_params(&cli.server).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let mut codec = CodecParams::default();
    if let Some(m) = args.argon2_memory_kib {
        codec.m_cost_kib = m;
    }

    let cfg = ServerConfig {
        host: args.host,
        port: args.port,
        engine: args.engine,
        data_dir: args.data_dir,
        messager: MessagerConfig {
            pin_size: args.pin_size,
            max_pin_attempts: args.max_pin_attempts,
            max_expire: Duration::from_secs(args.max_expire_secs),
        },
        codec,
        timing_floor: Duration::from_millis(args.timing_floor_ms),
        ..Default::default()
    };

    hush_server::run(cfg).await
}

async fn cmd_send(
    server: &str,
    message: &str,
    pin: &str,
    ttl: &str,
    domain: Option<&str>,
) -> Result<()> {
    let exp = parse_duration(ttl)?;
    let resp = Client::new()
        .post(format!("{}/api/v1/message", server.trim_end_matches('/')))
        .json(&json!({ "message": message, "exp": exp, "pin": pin }))
        .send()
        .await
        .context("request failed")?;

    let body = read_json(resp, StatusCode::CREATED).await?;
    let key = body["key"].as_str().context("missing key in response")?;
    println!("key:     {key}");
    if let Some(exp) = body["exp"].as_i64() {
        println!("expires: {exp} (unix)");
    }
    if let Some(domain) = domain {
        println!("link:    {}/message/{key}", domain.trim_end_matches('/'));
    }
    Ok(())
}

async fn cmd_read(server: &str, key: &str, pin: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!(
            "{}/api/v1/message/{key}/{pin}",
            server.trim_end_matches('/')
        ))
        .send()
        .await
        .context("request failed")?;

    let body = read_json(resp, StatusCode::OK).await?;
    let message = body["message"]
        .as_str()
        .context("missing message in response")?;
    println!("{message}");
    Ok(())
}

async fn cmd_params(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/api/v1/params", server.trim_end_matches('/')))
        .send()
        .await
        .context("request failed")?;

    let body = read_json(resp, StatusCode::OK).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn read_json(resp: reqwest::Response, expect: StatusCode) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if status != expect {
        let msg = body["error"].as_str().unwrap_or("unexpected response");
        anyhow::bail!("server returned {status}: {msg}");
    }
    Ok(body)
}

/// Parse a duration like `30s`, `15m`, `2h`, `7d` or a bare number of seconds.
fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let n: u64 = num
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    let mult = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => anyhow::bail!("unknown duration unit '{other}' in {s}"),
    };
    n.checked_mul(mult)
        .with_context(|| format!("duration overflows: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("90").unwrap(), 90);
        assert_eq!(parse_duration("45s").unwrap(), 45);
        assert_eq!(parse_duration("15m").unwrap(), 900);
        assert_eq!(parse_duration("2h").unwrap(), 7200);
        assert_eq!(parse_duration("1d").unwrap(), 86400);
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from([
            "hush",
            "serve",
            "--engine",
            "redb",
            "--pin-size",
            "4",
            "--max-expire-secs",
            "3600",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.engine, Engine::Redb);
                assert_eq!(args.pin_size, 4);
                assert_eq!(args.max_expire_secs, 3600);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn serve_reads_max_expire_from_env() {
        std::env::set_var("HUSH_MAX_EXPIRE_SECS", "60");
        let cli = Cli::try_parse_from(["hush", "serve"]).unwrap();
        std::env::remove_var("HUSH_MAX_EXPIRE_SECS");
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.max_expire_secs, 60),
            _ => panic!("expected serve"),
        }
    }
}

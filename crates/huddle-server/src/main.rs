//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # Self-signed certificate, in-memory store (development)
//! huddle-server --bind 0.0.0.0:4433 --token dev-alice=alice --token dev-bob=bob
//!
//! # TLS certificate and durable store
//! huddle-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem --db huddle.redb
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use huddle_core::SessionConfig;
use huddle_server::{
    DriverConfig, MemoryStorage, RedbStorage, Server, ServerRuntimeConfig,
    StaticTokenAuthenticator,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle presence and fanout server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Presence, room membership and realtime fanout over QUIC")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a connection may stay unauthenticated
    #[arg(long, default_value = "30")]
    handshake_timeout_secs: u64,

    /// Redb database for group membership and last-seen (in-memory if absent)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Accepted credential, as TOKEN=USER_ID (repeatable)
    #[arg(long = "token", value_parser = parse_token_mapping)]
    tokens: Vec<(String, String)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_token_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((token, user)) if !token.is_empty() && !user.is_empty() => {
            Ok((token.to_string(), user.to_string()))
        },
        _ => Err(format!("expected TOKEN=USER_ID, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle server starting");

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided, using self-signed certificate");
    }

    let authenticator = StaticTokenAuthenticator::new(args.tokens);
    if authenticator.is_empty() {
        tracing::warn!("no --token configured, every handshake will be refused");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig {
            session: SessionConfig {
                handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
            },
            max_connections: args.max_connections,
        },
        ..Default::default()
    };

    let server = match args.db {
        Some(path) => {
            tracing::info!(path = %path.display(), "using redb storage");
            Server::bind(config, authenticator, RedbStorage::open(&path)?)?
        },
        None => {
            tracing::warn!("no --db given, group membership and last-seen are not persisted");
            Server::bind(config, authenticator, MemoryStorage::new())?
        },
    };

    tracing::info!(addr = %server.local_addr()?, "server listening");

    server.run().await?;

    Ok(())
}

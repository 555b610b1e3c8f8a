//! Signaling server for one-to-many live broadcasts
//!
//! Run with: cargo run --bin peercast-server -- [OPTIONS]
//!
//! Examples:
//!   peercast-server                          # binds to 0.0.0.0:3000
//!   peercast-server --bind localhost         # binds to 127.0.0.1:3000
//!   peercast-server --bind 127.0.0.1:3001    # binds to 127.0.0.1:3001
//!   PEERCAST_VERIFY_RELAY=true peercast-server
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use peercast::registry::config::{DEFAULT_MAX_ROOM_ID_LEN, DEFAULT_OUTBOUND_CAPACITY};
use peercast::registry::RegistryConfig;
use peercast::server::config::DEFAULT_PORT;
use peercast::{ServerConfig, SignalServer};

#[derive(Debug, Parser)]
#[command(name = "peercast-server", version, about)]
struct Args {
    /// Address to bind to (IP:PORT, IP, or localhost)
    #[arg(long, env = "PEERCAST_BIND", default_value = "0.0.0.0:3000", value_parser = parse_bind_addr)]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "PEERCAST_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Only relay between participants that share a room
    #[arg(long, env = "PEERCAST_VERIFY_RELAY")]
    verify_relay: bool,

    /// Longest accepted room id in bytes
    #[arg(long, env = "PEERCAST_MAX_ROOM_ID_LEN", default_value_t = DEFAULT_MAX_ROOM_ID_LEN)]
    max_room_id_len: usize,

    /// Messages queued per connection before new ones are dropped
    #[arg(long, env = "PEERCAST_OUTBOUND_CAPACITY", default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    outbound_capacity: usize,

    /// Seconds between stats log lines (0 = off)
    #[arg(long, env = "PEERCAST_STATS_INTERVAL", default_value_t = 30)]
    stats_interval: u64,
}

/// Parse a bind address
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:3000
/// - "localhost:3001" -> 127.0.0.1:3001
/// - "127.0.0.1" -> 127.0.0.1:3000
/// - "0.0.0.0:3000" -> 0.0.0.0:3000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "invalid bind address '{}', expected IP:PORT, IP or 'localhost'",
        arg
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::with_addr(args.bind)
        .max_connections(args.max_connections)
        .stats_interval(Duration::from_secs(args.stats_interval));
    let registry_config = RegistryConfig::default()
        .verify_relay_peers(args.verify_relay)
        .max_room_id_len(args.max_room_id_len)
        .outbound_capacity(args.outbound_capacity);

    tracing::info!(
        bind = %config.bind_addr,
        verify_relay = args.verify_relay,
        "Starting signaling server"
    );

    let server = SignalServer::with_registry_config(config, registry_config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_addr() {
        assert_eq!(
            parse_bind_addr("localhost").unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("localhost:3001").unwrap().port(),
            3001
        );
        assert_eq!(
            parse_bind_addr("10.0.0.1").unwrap(),
            "10.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_bind_addr("not an address").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["peercast-server"]).unwrap();
        assert_eq!(args.bind.port(), DEFAULT_PORT);
        assert!(!args.verify_relay);
        assert_eq!(args.max_room_id_len, DEFAULT_MAX_ROOM_ID_LEN);
        assert_eq!(args.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
    }
}

//! Command-line and environment configuration.
//!
//! `NodeArgs` is what clap parses; `NodeConfig` is the validated form the
//! runtime is built from.

use clap::Parser;
use rst_core::{NodeId, NodeIdError, WatchdogConfig};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Host value that asks for the first non-loopback interface address.
pub const AUTO_HOST: &str = "auto";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid node ID: {0}")]
    InvalidId(#[from] NodeIdError),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Connect timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rst-node")]
#[command(about = "Rooted spanning tree node: flooding and Go/Back waves over TCP")]
pub struct NodeArgs {
    /// Port to listen on; also this node's identity
    #[arg(short, long, env = "RST_PORT")]
    pub port: u16,

    /// Host peers are reached on and the listener binds to ("auto" picks the
    /// first non-loopback interface)
    #[arg(long, env = "RST_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Neighbour identities (their ports)
    pub neighbours: Vec<String>,

    /// This node's own contribution to the aggregated value set
    #[arg(long, env = "RST_VALUE", default_value_t = 1)]
    pub value: i64,

    /// Give up connecting to a neighbour after this long
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Report a wave stalled after this many seconds without a reply
    #[arg(long)]
    pub watchdog_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Validated node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: NodeId,
    pub host: IpAddr,
    pub port: u16,
    pub neighbours: Vec<NodeId>,
    pub value: i64,
    pub connect_timeout: Duration,
    pub watchdog: Option<WatchdogConfig>,
}

impl NodeConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<NodeArgs> for NodeConfig {
    type Error = ConfigError;

    fn try_from(args: NodeArgs) -> Result<Self, Self::Error> {
        if args.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let host = resolve_host(&args.host)?;
        let neighbours = args
            .neighbours
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<NodeId>, _>>()?;

        Ok(Self {
            id: NodeId::from(args.port),
            host,
            port: args.port,
            neighbours,
            value: args.value,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            watchdog: args.watchdog_secs.map(|secs| WatchdogConfig {
                stall_after: Duration::from_secs(secs),
            }),
        })
    }
}

/// Parse a host, resolving `auto` to a local interface address.
pub fn resolve_host(host: &str) -> Result<IpAddr, ConfigError> {
    if host == AUTO_HOST {
        return Ok(local_interface_addr().unwrap_or_else(|| {
            warn!("No non-loopback interface found, using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }));
    }
    host.parse()
        .map_err(|_| ConfigError::InvalidHost(host.to_string()))
}

/// Address of the interface the OS would route external traffic through.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
fn local_interface_addr() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let addr = socket.local_addr().ok()?.ip();
    debug!("Resolved local interface address {}", addr);
    (!addr.is_loopback() && !addr.is_unspecified()).then_some(addr)
}

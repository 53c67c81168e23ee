//! Outgoing connections to neighbours.
//!
//! `TcpTransport` keeps at most one connection per neighbour and writes
//! newline-delimited JSON frames on it. Writes to one neighbour are
//! serialized on that connection, so messages on a link arrive in the order
//! they were sent. A failed connect or write is reported to the caller and
//! the connection is dropped; nothing is retried here.

use async_trait::async_trait;
use rst_core::protocol::encode_frame;
use rst_core::transport::Result;
use rst_core::{Message, NodeId, Transport, TransportError};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

type Slot = Arc<Mutex<Option<TcpStream>>>;

/// Transport that reaches neighbour `N` at `host:N`.
pub struct TcpTransport {
    host: IpAddr,
    connect_timeout: Duration,
    /// One slot per destination, created on first send
    connections: Mutex<HashMap<NodeId, Slot>>,
}

impl TcpTransport {
    pub fn new(host: IpAddr, connect_timeout: Duration) -> Self {
        Self {
            host,
            connect_timeout,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Socket address for a neighbour identity.
    pub fn address_of(&self, peer: &NodeId) -> Result<String> {
        let port: u16 = peer
            .as_str()
            .parse()
            .map_err(|_| TransportError::ConnectionFailed {
                peer: peer.clone(),
                reason: "identity is not a port number".to_string(),
            })?;
        Ok(format!("{}:{}", self.host, port))
    }

    /// Number of neighbours with an open connection.
    pub async fn open_connections(&self) -> usize {
        let slots: Vec<Slot> = self.connections.lock().await.values().cloned().collect();
        let mut open = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                open += 1;
            }
        }
        open
    }

    async fn slot(&self, peer: &NodeId) -> Slot {
        self.connections
            .lock()
            .await
            .entry(peer.clone())
            .or_default()
            .clone()
    }

    async fn connect(&self, peer: &NodeId) -> Result<TcpStream> {
        let address = self.address_of(peer)?;
        match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                debug!("Connected to {} at {}", peer, address);
                Ok(stream)
            }
            Ok(Err(e)) => Err(TransportError::ConnectionFailed {
                peer: peer.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                peer: peer.clone(),
                after_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, message: &Message, destination: &NodeId) -> Result<()> {
        let slot = self.slot(destination).await;
        let mut connection = slot.lock().await;

        if connection.is_none() {
            *connection = Some(self.connect(destination).await?);
        }
        let Some(stream) = connection.as_mut() else {
            return Err(TransportError::SendFailed {
                peer: destination.clone(),
                reason: "no connection".to_string(),
            });
        };

        let frame = encode_frame(message);
        let written = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            // The peer went away; the next send reconnects
            *connection = None;
            return Err(TransportError::SendFailed {
                peer: destination.clone(),
                reason: e.to_string(),
            });
        }

        debug!("Sent {} to {}", message.intent, destination);
        Ok(())
    }
}

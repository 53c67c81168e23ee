//! Transport trait for point-to-point message delivery.
//!
//! Implementations:
//! - `TcpTransport` (in rst-node): one persistent TCP connection per neighbour, bounded connect timeout
//! - `RecordingTransport`: records sends in memory, for testing
//!
//! Sends are best-effort and never retried here; the caller decides what a
//! failure means (the engines log it and carry on).

use crate::protocol::{DecodeError, Message};
use crate::NodeId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: NodeId, reason: String },

    #[error("Connection to {peer} timed out after {after_ms}ms")]
    Timeout { peer: NodeId, after_ms: u64 },

    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: NodeId, reason: String },
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Item produced by a listener.
#[derive(Debug)]
pub enum Inbound {
    /// A well-formed message.
    Message(Message),
    /// Bytes that could not be decoded; `origin` is a transport-level label
    /// such as the remote socket address.
    DecodeFailure { origin: String, error: DecodeError },
}

/// Outbound half of the transport adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `destination`.
    async fn send(&self, message: &Message, destination: &NodeId) -> Result<()>;
}

/// In-memory transport that records every send.
///
/// Destinations marked unreachable fail with `ConnectionFailed`.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(NodeId, Message)>>,
    unreachable: Mutex<HashSet<NodeId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send to `peer` fail.
    pub fn set_unreachable(&self, peer: NodeId) {
        self.unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer);
    }

    /// Every successful send so far, in order.
    pub fn sent(&self) -> Vec<(NodeId, Message)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove and return the recorded sends.
    pub fn take_sent(&self) -> Vec<(NodeId, Message)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &Message, destination: &NodeId) -> Result<()> {
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(destination);
        if unreachable {
            return Err(TransportError::ConnectionFailed {
                peer: destination.clone(),
                reason: "unreachable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((destination.clone(), message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_recording_transport_records() {
        let transport = RecordingTransport::new();
        transport.send(&Message::ping(id("A")), &id("B")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, id("B"));
    }

    #[tokio::test]
    async fn test_unreachable_fails() {
        let transport = RecordingTransport::new();
        transport.set_unreachable(id("B"));

        let err = transport
            .send(&Message::ping(id("A")), &id("B"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
        assert!(transport.take_sent().is_empty());
    }
}

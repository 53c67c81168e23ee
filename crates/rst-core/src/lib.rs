//! rst-core: rooted spanning tree construction over an arbitrary graph.
//!
//! This crate provides the per-node protocol logic, independent of any
//! socket or runtime:
//! - Communication graph discovery by flooding (Position messages with the
//!   Forward/Discard rule)
//! - Rooted spanning tree construction by Go/Back waves, aggregating one
//!   value per node at the root
//! - The wire message types and the `Transport` trait the engines are driven
//!   through
//!
//! Engines mutate a `NodeState` and return `Effects` (messages to send and
//! events to publish); the caller owns all I/O.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod flooding;
pub mod mesh;
pub mod node_id;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod watchdog;
pub mod wave;

pub use channel::Channel;
pub use dispatcher::dispatch;
pub use error::{Error, ProtocolViolation};
pub use events::{EventBus, NodeEvent, Subscription};
pub use mesh::{DeliveryOrder, LocalMesh, MeshError};
pub use node_id::{NodeId, NodeIdError};
pub use protocol::{Intent, Message, ValuePair};
pub use state::{Effects, NodeSnapshot, NodeState, Outbound, StateError, WavePhase};
pub use transport::{Inbound, RecordingTransport, Transport, TransportError};
pub use watchdog::{StallReport, Watchdog, WatchdogConfig};

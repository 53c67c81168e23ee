//! rst-node library: the TCP side of a spanning tree node.
//!
//! The binary wires these together; integration tests use them directly to
//! run several nodes in one process.

pub mod cli;
pub mod config;
pub mod connection;
pub mod node;
pub mod server;

pub use cli::{Command, CommandError, Field};
pub use config::{ConfigError, NodeArgs, NodeConfig};
pub use connection::TcpTransport;
pub use node::{Node, SendReport};
pub use server::Listener;

//! NodeId: identity of a process taking part in the protocol.
//!
//! In practice this is the listening port of the node, but the protocol only
//! relies on it being a stable, comparable string.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("Node ID cannot be empty")]
    Empty,
    #[error("Node ID cannot contain whitespace: {0:?}")]
    Whitespace(String),
}

/// Identity of a node in the communication graph.
///
/// # Examples
/// ```
/// use rst_core::NodeId;
///
/// let id: NodeId = "8001".parse().unwrap();
/// assert_eq!(id.as_str(), "8001");
/// assert!("".parse::<NodeId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NodeIdError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(NodeIdError::Whitespace(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A port number is always a valid identity.
impl From<u16> for NodeId {
    fn from(port: u16) -> Self {
        Self(port.to_string())
    }
}

// Serialize as a bare string so the wire format stays `"source": "8001"`
impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        let id: NodeId = "8001".parse().unwrap();
        assert_eq!(id.as_str(), "8001");
        assert_eq!(id.to_string(), "8001");
    }

    #[test]
    fn test_from_port() {
        assert_eq!(NodeId::from(8001), "8001".parse().unwrap());
    }

    #[test]
    fn test_reject_empty() {
        assert_eq!("".parse::<NodeId>(), Err(NodeIdError::Empty));
    }

    #[test]
    fn test_reject_whitespace() {
        assert!("80 01".parse::<NodeId>().is_err());
        assert!("8001\n".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a: NodeId = "A".parse().unwrap();
        let b: NodeId = "B".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id: NodeId = "9000".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"9000\"");
        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_serde_rejects_empty() {
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
    }
}

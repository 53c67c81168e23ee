//! Wire message exchanged between nodes.
//!
//! Wire format (one JSON object per message):
//! `{"source":"8001","intent":"back","data":"","valSet":[{"i":"8002","j":1}],"neighbours":[]}`

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// What the receiver is asked to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Flooding announcement of the source's neighbour list.
    #[serde(alias = "send position")]
    Position,
    /// Wave propagation away from the root.
    Go,
    /// Wave reply towards the root.
    Back,
    /// Liveness check from the command surface.
    Ping,
    /// Any intent this build does not understand.
    #[serde(other)]
    Unknown,
}

impl Display for Intent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Position => "position",
            Self::Go => "go",
            Self::Back => "back",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One contribution collected up the spanning tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValuePair {
    #[serde(rename = "i")]
    pub origin: NodeId,
    #[serde(rename = "j")]
    pub value: i64,
}

impl ValuePair {
    pub fn new(origin: NodeId, value: i64) -> Self {
        Self { origin, value }
    }
}

/// A protocol message.
///
/// `val_set` is `None` on a Back that carries no contribution (the reply a
/// node sends to a Go from a neighbour that is not its parent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub source: NodeId,
    pub intent: Intent,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub val_set: Option<Vec<ValuePair>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbours: Vec<NodeId>,
    /// Immediate sender of a forwarded Position, when it differs from `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<NodeId>,
}

impl Message {
    /// Announce `neighbours` as the edge set incident to `source`.
    pub fn position(source: NodeId, neighbours: Vec<NodeId>) -> Self {
        Self {
            source,
            intent: Intent::Position,
            data: String::new(),
            val_set: None,
            neighbours,
            via: None,
        }
    }

    /// Carry the wave outward.
    pub fn go(source: NodeId, data: impl Into<String>) -> Self {
        Self {
            source,
            intent: Intent::Go,
            data: data.into(),
            val_set: None,
            neighbours: Vec::new(),
            via: None,
        }
    }

    /// Reply towards the root, with or without a contribution.
    pub fn back(source: NodeId, val_set: Option<Vec<ValuePair>>) -> Self {
        Self {
            source,
            intent: Intent::Back,
            data: String::new(),
            val_set,
            neighbours: Vec::new(),
            via: None,
        }
    }

    pub fn ping(source: NodeId) -> Self {
        Self {
            source,
            intent: Intent::Ping,
            data: String::new(),
            val_set: None,
            neighbours: Vec::new(),
            via: None,
        }
    }

    /// Copy of this Position as forwarded by `via`; `source` is unchanged.
    pub fn forwarded_by(&self, via: NodeId) -> Self {
        let via = if via == self.source { None } else { Some(via) };
        Self {
            via,
            ..self.clone()
        }
    }

    /// The neighbour this message was received from.
    pub fn sender(&self) -> &NodeId {
        self.via.as_ref().unwrap_or(&self.source)
    }

    /// The contribution carried by a Back, if any.
    ///
    /// An absent and an empty value set both mean "no contribution".
    pub fn contribution(&self) -> Option<&[ValuePair]> {
        match &self.val_set {
            Some(values) if !values.is_empty() => Some(values),
            _ => None,
        }
    }

    /// Serialize to JSON bytes (no trailing newline).
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Message serialization should not fail")
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Message {{ source: {}, intent: {} }}", self.source, self.intent)
    }
}

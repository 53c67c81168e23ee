//! Communication channels (undirected edges) between two nodes.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// An undirected edge `(I, J)` of the communication graph.
///
/// The endpoints are stored in sorted order, so `(I, J)` and `(J, I)` compare
/// and hash as the same channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel {
    i: NodeId,
    j: NodeId,
}

impl Channel {
    /// Create a channel between two nodes, in either orientation.
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { i: a, j: b }
        } else {
            Self { i: b, j: a }
        }
    }

    /// Both endpoints, lowest identity first.
    pub fn endpoints(&self) -> (&NodeId, &NodeId) {
        (&self.i, &self.j)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

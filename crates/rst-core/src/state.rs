//! Per-process knowledge base shared by the flooding and wave engines.
//!
//! A `NodeState` is created once from the static neighbour list and is only
//! ever mutated by the engines in `flooding` and `wave`. Callers that share it
//! across tasks must serialize access (one lock per node).

use crate::events::NodeEvent;
use crate::protocol::{Message, ValuePair};
use crate::{Channel, NodeId};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Node {0} lists itself as a neighbour")]
    SelfLoop(NodeId),

    #[error("Neighbour {0} is listed more than once")]
    DuplicateNeighbour(NodeId),
}

/// Progress of the wave at this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WavePhase {
    /// No parent yet.
    Unstarted,
    /// Parent assigned, replies outstanding.
    Active,
    /// Every expected reply received.
    Done,
}

/// One message to deliver to a neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: NodeId,
    pub message: Message,
}

/// Everything an engine operation asks its caller to do.
///
/// Sends may be performed in any order (or concurrently); events are
/// in the order they happened.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Effects {
    pub outbound: Vec<Outbound>,
    pub events: Vec<NodeEvent>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: NodeId, message: Message) {
        self.outbound.push(Outbound { to, message });
    }

    pub fn emit(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    /// Append another batch of effects after this one.
    pub fn extend(&mut self, other: Effects) {
        self.outbound.extend(other.outbound);
        self.events.extend(other.events);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }
}

/// Node knowledge at one process.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub(crate) id: NodeId,
    pub(crate) neighbours: Vec<NodeId>,
    pub(crate) processes_known: BTreeSet<NodeId>,
    pub(crate) channels_known: HashSet<Channel>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: BTreeSet<NodeId>,
    pub(crate) expected_replies: usize,
    pub(crate) value_set: Vec<ValuePair>,
    pub(crate) participating: bool,
    /// Neighbours a Go was sent to that have not replied yet.
    pub(crate) pending: BTreeSet<NodeId>,
}

impl NodeState {
    /// Create the initial state of a node.
    ///
    /// The node knows itself, its incident channels, and holds its own
    /// contribution `value` in the value set.
    pub fn new(id: NodeId, neighbours: Vec<NodeId>, value: i64) -> Result<Self, StateError> {
        let mut seen = HashSet::new();
        for neighbour in &neighbours {
            if neighbour == &id {
                return Err(StateError::SelfLoop(id));
            }
            if !seen.insert(neighbour) {
                return Err(StateError::DuplicateNeighbour(neighbour.clone()));
            }
        }

        let channels_known = neighbours
            .iter()
            .map(|n| Channel::new(id.clone(), n.clone()))
            .collect();

        Ok(Self {
            processes_known: BTreeSet::from([id.clone()]),
            value_set: vec![ValuePair::new(id.clone(), value)],
            id,
            neighbours,
            channels_known,
            parent: None,
            children: BTreeSet::new(),
            expected_replies: 0,
            participating: false,
            pending: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn neighbours(&self) -> &[NodeId] {
        &self.neighbours
    }

    pub fn is_neighbour(&self, node: &NodeId) -> bool {
        self.neighbours.contains(node)
    }

    pub fn processes_known(&self) -> &BTreeSet<NodeId> {
        &self.processes_known
    }

    pub fn channels_known(&self) -> &HashSet<Channel> {
        &self.channels_known
    }

    /// Known channels in sorted order, for display.
    pub fn sorted_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.channels_known.iter().cloned().collect();
        channels.sort();
        channels
    }

    pub fn knows_channel(&self, a: &NodeId, b: &NodeId) -> bool {
        self.channels_known
            .contains(&Channel::new(a.clone(), b.clone()))
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn expected_replies(&self) -> usize {
        self.expected_replies
    }

    pub fn value_set(&self) -> &[ValuePair] {
        &self.value_set
    }

    pub fn is_participating(&self) -> bool {
        self.participating
    }

    /// Neighbours that were sent a Go and have not answered.
    pub fn pending_replies(&self) -> &BTreeSet<NodeId> {
        &self.pending
    }

    /// Whether this node started the wave.
    pub fn is_root(&self) -> bool {
        self.parent.as_ref() == Some(&self.id)
    }

    pub fn phase(&self) -> WavePhase {
        match (&self.parent, self.expected_replies) {
            (None, _) => WavePhase::Unstarted,
            (Some(_), 0) => WavePhase::Done,
            (Some(_), _) => WavePhase::Active,
        }
    }

    /// Root has heard back from every neighbour.
    pub fn is_aggregation_complete(&self) -> bool {
        self.is_root() && self.phase() == WavePhase::Done
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            neighbours: self.neighbours.clone(),
            processes_known: self.processes_known.iter().cloned().collect(),
            channels_known: self.sorted_channels(),
            parent: self.parent.clone(),
            children: self.children.iter().cloned().collect(),
            expected_replies: self.expected_replies,
            pending_replies: self.pending.iter().cloned().collect(),
            value_set: self.value_set.clone(),
            participating: self.participating,
            phase: self.phase(),
        }
    }
}

/// Serializable view of a `NodeState`, with every collection sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub neighbours: Vec<NodeId>,
    pub processes_known: Vec<NodeId>,
    pub channels_known: Vec<Channel>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expected_replies: usize,
    pub pending_replies: Vec<NodeId>,
    pub value_set: Vec<ValuePair>,
    pub participating: bool,
    pub phase: WavePhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    fn ids(list: &[&str]) -> Vec<NodeId> {
        list.iter().map(|s| id(s)).collect()
    }

    #[test]
    fn test_initial_state() {
        let state = NodeState::new(id("B"), ids(&["A", "C"]), 1).unwrap();

        assert_eq!(state.id(), &id("B"));
        assert_eq!(state.neighbours(), ids(&["A", "C"]).as_slice());
        assert_eq!(state.processes_known().len(), 1);
        assert!(state.processes_known().contains(&id("B")));
        assert_eq!(state.channels_known().len(), 2);
        assert!(state.knows_channel(&id("A"), &id("B")));
        assert!(state.knows_channel(&id("C"), &id("B")));
        assert!(state.parent().is_none());
        assert!(state.children().is_empty());
        assert_eq!(state.value_set(), &[ValuePair::new(id("B"), 1)]);
        assert!(!state.is_participating());
        assert_eq!(state.phase(), WavePhase::Unstarted);
    }

    #[test]
    fn test_reject_self_loop() {
        let err = NodeState::new(id("A"), ids(&["B", "A"]), 1).unwrap_err();
        assert_eq!(err, StateError::SelfLoop(id("A")));
    }

    #[test]
    fn test_reject_duplicate_neighbour() {
        let err = NodeState::new(id("A"), ids(&["B", "C", "B"]), 1).unwrap_err();
        assert_eq!(err, StateError::DuplicateNeighbour(id("B")));
    }

    #[test]
    fn test_isolated_node_is_valid() {
        let state = NodeState::new(id("A"), vec![], 7).unwrap();
        assert!(state.channels_known().is_empty());
        assert_eq!(state.value_set()[0].value, 7);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let state = NodeState::new(id("B"), ids(&["C", "A"]), 1).unwrap();
        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.channels_known,
            vec![Channel::new(id("A"), id("B")), Channel::new(id("B"), id("C"))]
        );
        // Neighbour order is preserved as configured
        assert_eq!(snapshot.neighbours, ids(&["C", "A"]));
    }

    #[test]
    fn test_effects_extend_keeps_order() {
        let mut first = Effects::new();
        first.send(id("A"), Message::ping(id("B")));
        let mut second = Effects::new();
        second.send(id("C"), Message::ping(id("B")));
        second.emit(NodeEvent::PositionDiscarded { source: id("A") });

        first.extend(second);
        let targets: Vec<_> = first.outbound.iter().map(|o| o.to.clone()).collect();
        assert_eq!(targets, ids(&["A", "C"]));
        assert_eq!(first.events.len(), 1);
    }
}

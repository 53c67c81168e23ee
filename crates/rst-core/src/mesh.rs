//! In-memory mesh of nodes for running whole-graph scenarios.
//!
//! Messages travel on directed links. Each link is FIFO; across links the
//! delivery order is either global FIFO or a random interleaving chosen by a
//! seeded RNG, so the same seed always replays the same run.

use crate::dispatcher::dispatch;
use crate::error::ProtocolViolation;
use crate::events::NodeEvent;
use crate::node_id::NodeIdError;
use crate::protocol::{Intent, Message};
use crate::state::{Effects, NodeState, StateError};
use crate::{Channel, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Invalid node ID: {0}")]
    InvalidId(#[from] NodeIdError),

    #[error("Invalid node: {0}")]
    State(#[from] StateError),

    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

pub type Result<T> = std::result::Result<T, MeshError>;

/// How in-flight messages on different links are interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOrder {
    /// Oldest message first, across all links.
    Fifo,
    /// Random link each step, reproducible from `seed`.
    Shuffled { seed: u64 },
}

#[derive(Debug, Clone)]
struct Envelope {
    from: NodeId,
    to: NodeId,
    message: Message,
}

/// A set of nodes wired together by in-memory links.
pub struct LocalMesh {
    nodes: BTreeMap<NodeId, NodeState>,
    edges: BTreeSet<Channel>,
    in_flight: VecDeque<Envelope>,
    rng: Option<StdRng>,
    unreachable: HashSet<NodeId>,
    delivered: HashMap<Intent, usize>,
    /// Deliveries per directed link (from, to) and intent
    links: HashMap<(NodeId, NodeId, Intent), usize>,
    failed_sends: usize,
    events: Vec<(NodeId, NodeEvent)>,
    violations: Vec<(NodeId, ProtocolViolation)>,
}

impl LocalMesh {
    /// Build a mesh from an undirected edge list. Every node contributes 1.
    ///
    /// Neighbour lists follow the order in which edges are listed.
    pub fn from_edges(edges: &[(&str, &str)]) -> Result<Self> {
        let mut order: Vec<NodeId> = Vec::new();
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut channels = BTreeSet::new();

        for (a, b) in edges {
            let a: NodeId = a.parse()?;
            let b: NodeId = b.parse()?;
            for node in [&a, &b] {
                if !adjacency.contains_key(node) {
                    order.push(node.clone());
                    adjacency.insert(node.clone(), Vec::new());
                }
            }
            channels.insert(Channel::new(a.clone(), b.clone()));
            adjacency.entry(a.clone()).or_default().push(b.clone());
            if a != b {
                adjacency.entry(b).or_default().push(a);
            }
        }

        let mut nodes = BTreeMap::new();
        for id in order {
            let neighbours = adjacency.remove(&id).unwrap_or_default();
            let state = NodeState::new(id.clone(), neighbours, 1)?;
            nodes.insert(id, state);
        }

        Ok(Self {
            nodes,
            edges: channels,
            in_flight: VecDeque::new(),
            rng: None,
            unreachable: HashSet::new(),
            delivered: HashMap::new(),
            links: HashMap::new(),
            failed_sends: 0,
            events: Vec::new(),
            violations: Vec::new(),
        })
    }

    pub fn with_order(mut self, order: DeliveryOrder) -> Self {
        self.rng = match order {
            DeliveryOrder::Fifo => None,
            DeliveryOrder::Shuffled { seed } => Some(StdRng::seed_from_u64(seed)),
        };
        self
    }

    /// Make every send to `id` fail, as if the process had died.
    pub fn set_unreachable(&mut self, id: &str) -> Result<()> {
        let id = self.resolve(id)?;
        self.unreachable.insert(id);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        let id: NodeId = id.parse().ok()?;
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    /// Every channel of the graph the mesh was built from.
    pub fn edges(&self) -> &BTreeSet<Channel> {
        &self.edges
    }

    pub fn initiate_flooding(&mut self, id: &str) -> Result<()> {
        let id = self.resolve(id)?;
        let effects = self.state_mut(&id)?.initiate_flooding();
        self.apply(&id, effects);
        Ok(())
    }

    pub fn start_wave(&mut self, id: &str, data: &str) -> Result<()> {
        let id = self.resolve(id)?;
        let effects = self.state_mut(&id)?.start_as_root(data);
        self.apply(&id, effects);
        Ok(())
    }

    /// Put an arbitrary message on the link `from -> to`.
    pub fn inject(&mut self, from: &str, to: &str, message: Message) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.in_flight.push_back(Envelope { from, to, message });
        Ok(())
    }

    /// Deliver one message. Returns false when nothing is in flight.
    pub fn step(&mut self) -> bool {
        let Some(envelope) = self.next_envelope() else {
            return false;
        };
        let intent = envelope.message.intent;
        *self.delivered.entry(intent).or_default() += 1;
        *self
            .links
            .entry((envelope.from.clone(), envelope.to.clone(), intent))
            .or_default() += 1;

        let Some(state) = self.nodes.get_mut(&envelope.to) else {
            return true;
        };
        match dispatch(state, &envelope.message) {
            Ok(effects) => self.apply(&envelope.to, effects),
            Err(violation) => {
                debug!(
                    "{} rejected message from {}: {}",
                    envelope.to, envelope.from, violation
                );
                self.violations.push((envelope.to, violation));
            }
        }
        true
    }

    /// Deliver until no message is in flight. Returns the number delivered.
    pub fn run(&mut self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        steps
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Messages delivered so far with the given intent.
    pub fn delivered(&self, intent: Intent) -> usize {
        self.delivered.get(&intent).copied().unwrap_or(0)
    }

    /// Messages with the given intent delivered from `from` to `to`.
    pub fn delivered_on(&self, from: &NodeId, to: &NodeId, intent: Intent) -> usize {
        self.links
            .get(&(from.clone(), to.clone(), intent))
            .copied()
            .unwrap_or(0)
    }

    pub fn failed_sends(&self) -> usize {
        self.failed_sends
    }

    pub fn events(&self) -> &[(NodeId, NodeEvent)] {
        &self.events
    }

    pub fn violations(&self) -> &[(NodeId, ProtocolViolation)] {
        &self.violations
    }

    fn resolve(&self, id: &str) -> Result<NodeId> {
        let id: NodeId = id.parse()?;
        if self.nodes.contains_key(&id) {
            Ok(id)
        } else {
            Err(MeshError::UnknownNode(id.to_string()))
        }
    }

    fn state_mut(&mut self, id: &NodeId) -> Result<&mut NodeState> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| MeshError::UnknownNode(id.to_string()))
    }

    fn apply(&mut self, from: &NodeId, effects: Effects) {
        for event in effects.events {
            self.events.push((from.clone(), event));
        }
        for out in effects.outbound {
            if self.unreachable.contains(&out.to) {
                debug!("{} could not reach {}", from, out.to);
                self.failed_sends += 1;
                continue;
            }
            self.in_flight.push_back(Envelope {
                from: from.clone(),
                to: out.to,
                message: out.message,
            });
        }
    }

    fn next_envelope(&mut self) -> Option<Envelope> {
        let Some(rng) = self.rng.as_mut() else {
            return self.in_flight.pop_front();
        };

        // Links with traffic, in order of their oldest message
        let mut links: Vec<(&NodeId, &NodeId)> = Vec::new();
        for envelope in &self.in_flight {
            let link = (&envelope.from, &envelope.to);
            if !links.contains(&link) {
                links.push(link);
            }
        }
        if links.is_empty() {
            return None;
        }

        let (from, to) = links[rng.random_range(0..links.len())];
        let index = self
            .in_flight
            .iter()
            .position(|e| &e.from == from && &e.to == to)?;
        self.in_flight.remove(index)
    }
}

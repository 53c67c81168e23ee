//! Communication graph discovery by controlled flooding.
//!
//! Every node announces its neighbour list once. A node that receives an
//! announcement forwards it only if it learned at least one new channel from
//! it (Forward/Discard); since `channels_known` only grows, each node forwards
//! a given announcement at most once and flooding terminates on any graph.

use crate::events::NodeEvent;
use crate::protocol::Message;
use crate::state::{Effects, NodeState};
use crate::{Channel, NodeId};
use tracing::debug;

impl NodeState {
    /// Join the flooding phase by announcing our neighbour list to every
    /// neighbour. Calling it again is a no-op.
    pub fn initiate_flooding(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.participating {
            return effects;
        }
        self.participating = true;

        let announcement = Message::position(self.id.clone(), self.neighbours.clone());
        for neighbour in &self.neighbours {
            effects.send(neighbour.clone(), announcement.clone());
        }
        debug!(
            "{} joined flooding, announcing {} neighbour(s)",
            self.id,
            self.neighbours.len()
        );
        effects
    }

    /// Handle a Position announcement.
    ///
    /// `msg.source` is the announcing node and `msg.neighbours` its
    /// neighbour list; `msg.sender()` is the neighbour it arrived from.
    pub fn on_position(&mut self, msg: &Message) -> Effects {
        let mut effects = self.initiate_flooding();
        let source = &msg.source;

        self.processes_known.insert(source.clone());

        let new_channels: Vec<Channel> = msg
            .neighbours
            .iter()
            .filter(|n| *n != source)
            .map(|n| Channel::new(source.clone(), n.clone()))
            .filter(|c| !self.channels_known.contains(c))
            .collect();

        if new_channels.is_empty() {
            debug!("{} discarding position of {} (nothing new)", self.id, source);
            effects.emit(NodeEvent::PositionDiscarded {
                source: source.clone(),
            });
            return effects;
        }

        self.channels_known.extend(new_channels.iter().cloned());

        let sender = msg.sender().clone();
        let forwarded = msg.forwarded_by(self.id.clone());
        for neighbour in self.neighbours.iter().filter(|n| **n != sender) {
            effects.send(neighbour.clone(), forwarded.clone());
        }
        debug!(
            "{} learned {} channel(s) from {}, forwarding",
            self.id,
            new_channels.len(),
            source
        );
        effects.emit(NodeEvent::PositionAccepted {
            source: source.clone(),
            new_channels,
        });
        effects
    }

    /// Processes mentioned by known channels but not yet heard from directly.
    pub fn processes_unheard(&self) -> Vec<NodeId> {
        let mut unheard: Vec<NodeId> = self
            .channels_known
            .iter()
            .flat_map(|c| {
                let (i, j) = c.endpoints();
                [i.clone(), j.clone()]
            })
            .filter(|n| !self.processes_known.contains(n))
            .collect();
        unheard.sort();
        unheard.dedup();
        unheard
    }
}

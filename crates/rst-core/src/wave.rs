//! Rooted spanning tree construction with Go/Back waves.
//!
//! The root sends Go to every neighbour. A node adopts the sender of its
//! first Go as parent and passes the Go on to its other neighbours; every
//! later Go is answered at once with an empty Back. Once a node has one Back
//! per Go it sent, it reports its accumulated value set to its parent. The
//! root's value set then holds one contribution per node.

use crate::error::ProtocolViolation;
use crate::events::NodeEvent;
use crate::protocol::{Message, ValuePair};
use crate::state::{Effects, NodeState, WavePhase};
use crate::NodeId;
use tracing::{debug, info, warn};

impl NodeState {
    /// Start the wave with this node as root. No-op if a wave already reached
    /// this node.
    pub fn start_as_root(&mut self, data: impl Into<String>) -> Effects {
        let mut effects = Effects::new();
        if self.parent.is_some() {
            debug!("{} already in a wave, not restarting", self.id);
            return effects;
        }

        self.parent = Some(self.id.clone());
        self.children.clear();
        self.expected_replies = self.neighbours.len();
        self.pending = self.neighbours.iter().cloned().collect();

        let go = Message::go(self.id.clone(), data);
        for neighbour in &self.neighbours {
            effects.send(neighbour.clone(), go.clone());
        }
        info!(
            "{} started wave as root, expecting {} repl(ies)",
            self.id, self.expected_replies
        );

        if self.expected_replies == 0 {
            self.complete_as_root(&mut effects);
        }
        effects
    }

    /// Handle a Go from `source`.
    ///
    /// Every Go gets exactly one Back. A Go from a node missing from our
    /// neighbour list is answered with an empty Back and never adopted.
    pub fn on_go(&mut self, source: &NodeId, data: &str) -> Result<Effects, ProtocolViolation> {
        let mut effects = Effects::new();

        if !self.is_neighbour(source) {
            warn!(
                "{} got Go from {}, which is not a neighbour; empty Back",
                self.id, source
            );
            effects.send(source.clone(), Message::back(self.id.clone(), None));
            return Ok(effects);
        }

        if self.parent.is_some() {
            // Not our parent: answer without a contribution so the sender's
            // reply count still closes.
            effects.send(source.clone(), Message::back(self.id.clone(), None));
            debug!("{} already has a parent, empty Back to {}", self.id, source);
            return Ok(effects);
        }

        self.parent = Some(source.clone());
        self.children.clear();
        self.expected_replies = self.neighbours.len() - 1;
        info!("{} adopted {} as parent", self.id, source);
        effects.emit(NodeEvent::ParentAdopted {
            parent: source.clone(),
        });

        if self.expected_replies == 0 {
            self.report_to_parent(&mut effects);
            return Ok(effects);
        }

        let go = Message::go(self.id.clone(), data);
        for neighbour in self.neighbours.iter().filter(|n| *n != source) {
            self.pending.insert(neighbour.clone());
            effects.send(neighbour.clone(), go.clone());
        }
        Ok(effects)
    }

    /// Handle a Back from `source`, carrying `contribution` when `source` is
    /// a child.
    pub fn on_back(
        &mut self,
        source: &NodeId,
        contribution: Option<&[ValuePair]>,
    ) -> Result<Effects, ProtocolViolation> {
        if self.parent.is_none() {
            return Err(ProtocolViolation::BackWithoutParent {
                peer: source.clone(),
            });
        }
        if self.expected_replies == 0 {
            return Err(ProtocolViolation::UnexpectedBack {
                peer: source.clone(),
            });
        }

        let mut effects = Effects::new();

        // Every Back counts, whoever sent it
        self.expected_replies -= 1;
        if !self.pending.remove(source) {
            warn!(
                "{} counted a Back from {}, which was not awaiting a reply",
                self.id, source
            );
        }

        if let Some(values) = contribution.filter(|v| !v.is_empty()) {
            self.children.insert(source.clone());
            self.value_set.extend_from_slice(values);
            debug!(
                "{} confirmed child {} ({} value(s))",
                self.id,
                source,
                values.len()
            );
            effects.emit(NodeEvent::ChildConfirmed {
                child: source.clone(),
            });
        }

        if self.expected_replies == 0 {
            if self.is_root() {
                self.complete_as_root(&mut effects);
            } else {
                self.report_to_parent(&mut effects);
            }
        }
        Ok(effects)
    }

    fn report_to_parent(&self, effects: &mut Effects) {
        let Some(parent) = self.parent.clone() else {
            return;
        };
        effects.send(
            parent.clone(),
            Message::back(self.id.clone(), Some(self.value_set.clone())),
        );
        debug!(
            "{} reporting {} value(s) to parent {}",
            self.id,
            self.value_set.len(),
            parent
        );
        effects.emit(NodeEvent::WaveFinished { parent });
    }

    fn complete_as_root(&self, effects: &mut Effects) {
        debug_assert_eq!(self.phase(), WavePhase::Done);
        info!(
            "Root {} has received all value sets ({} contribution(s))",
            self.id,
            self.value_set.len()
        );
        effects.emit(NodeEvent::AggregationComplete {
            values: self.value_set.clone(),
        });
    }
}

//! Per-process node runtime.
//!
//! Owns the `NodeState` behind a single lock, applies inbound messages
//! through the dispatcher and performs the resulting sends. The lock is
//! released before any network I/O; sends produced by one delivery go out
//! concurrently, and the call returns once all of them have finished.

use futures::future::join_all;
use rst_core::{
    dispatch, Effects, Error, EventBus, Inbound, Message, NodeEvent, NodeId, NodeSnapshot, NodeState,
    StateError, Transport, Watchdog, WatchdogConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often the watchdog looks at the node state.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of sending one batch of effects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

/// A running node: state, transport and event bus.
pub struct Node<T: Transport> {
    id: NodeId,
    state: Arc<Mutex<NodeState>>,
    transport: Arc<T>,
    events: Arc<EventBus>,
}

impl<T: Transport + 'static> Node<T> {
    pub fn new(
        id: NodeId,
        neighbours: Vec<NodeId>,
        value: i64,
        transport: Arc<T>,
    ) -> Result<Self, StateError> {
        let state = NodeState::new(id.clone(), neighbours, value)?;
        Ok(Self {
            id,
            state: Arc::new(Mutex::new(state)),
            transport,
            events: Arc::new(EventBus::new()),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Event bus carrying every `NodeEvent` this node produces.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Lock the state. Do not hold the guard across sends.
    pub async fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Apply one inbound item. Decode failures and protocol violations are
    /// logged and dropped.
    pub async fn handle(&self, inbound: Inbound) -> SendReport {
        let message = match inbound {
            Inbound::Message(message) => message,
            Inbound::DecodeFailure { origin, error } => {
                self.recovered(&origin, error.into());
                return SendReport::default();
            }
        };

        let effects = {
            let mut state = self.state.lock().await;
            match dispatch(&mut state, &message) {
                Ok(effects) => effects,
                Err(violation) => {
                    let peer = violation.peer().to_string();
                    self.recovered(&peer, violation.into());
                    return SendReport::default();
                }
            }
        };
        self.perform(effects).await
    }

    /// Start flooding this node's neighbour list.
    pub async fn flood(&self) -> SendReport {
        let effects = self.state.lock().await.initiate_flooding();
        self.perform(effects).await
    }

    /// Start a wave with this node as root.
    pub async fn start_wave(&self, data: &str) -> SendReport {
        let effects = self.state.lock().await.start_as_root(data);
        self.perform(effects).await
    }

    /// Send a Ping to `peer`, which need not be a neighbour.
    pub async fn ping(&self, peer: &NodeId) -> SendReport {
        let mut effects = Effects::new();
        effects.send(peer.clone(), Message::ping(self.id.clone()));
        self.perform(effects).await
    }

    /// Wait until this node emits an event matching `predicate`.
    ///
    /// Subscribes before checking `already`, so an event emitted in between
    /// is not missed.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&NodeEvent) -> bool + Send + Sync + 'static,
        already: impl FnOnce(&NodeState) -> bool,
    ) {
        let notify = Arc::new(tokio::sync::Notify::new());
        let signal = notify.clone();
        let _subscription = self.events.subscribe(move |event| {
            if predicate(event) {
                signal.notify_one();
            }
        });

        if already(&*self.state.lock().await) {
            return;
        }
        notify.notified().await;
    }

    /// Spawn a task that reports stalls to the log until aborted.
    pub fn spawn_watchdog(self: &Arc<Self>, config: WatchdogConfig) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let mut watchdog = Watchdog::new(config);
            let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
            loop {
                interval.tick().await;
                let now_ms = started.elapsed().as_millis() as u64;
                let report = watchdog.tick(now_ms, &*node.state.lock().await);
                if let Some(report) = report {
                    warn!(
                        "{} stalled for {:?}: {} repl(ies) outstanding, waiting on {:?}",
                        node.id,
                        report.stalled_for,
                        report.expected_replies,
                        report.waiting_on
                    );
                }
            }
        })
    }

    /// Every failure is handled the same way: log it, drop the delivery and
    /// carry on.
    fn recovered(&self, peer: &str, error: Error) {
        warn!("{} dropped delivery involving {}: {}", self.id, peer, error);
    }

    /// Publish events, then perform all sends concurrently.
    async fn perform(&self, effects: Effects) -> SendReport {
        for event in &effects.events {
            self.events.emit(event);
        }

        let sends = effects.outbound.iter().map(|out| async move {
            match self.transport.send(&out.message, &out.to).await {
                Ok(()) => true,
                Err(e) => {
                    self.recovered(out.to.as_str(), e.into());
                    false
                }
            }
        });
        let results = join_all(sends).await;

        let sent = results.iter().filter(|ok| **ok).count();
        let report = SendReport {
            sent,
            failed: results.len() - sent,
        };
        if report != SendReport::default() {
            debug!("{} sent {} message(s), {} failed", self.id, report.sent, report.failed);
        }
        report
    }
}

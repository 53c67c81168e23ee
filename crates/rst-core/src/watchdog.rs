//! Stall detection for the wave.
//!
//! A lost Go or Back leaves a node waiting forever, and its parent with it.
//! The watchdog only makes that visible: when a node stays `Active` without
//! receiving a reply for longer than `stall_after`, it reports which
//! neighbours are still pending. It never re-sends anything and never touches
//! the reply counters.

use crate::state::{NodeState, WavePhase};
use crate::NodeId;
use std::time::Duration;

/// Configuration for stall detection.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How long a node may wait without any reply (default: 30s)
    pub stall_after: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_after: Duration::from_secs(30),
        }
    }
}

/// Reported once per stall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallReport {
    pub expected_replies: usize,
    pub waiting_on: Vec<NodeId>,
    pub stalled_for: Duration,
}

/// Watches one node's reply counter over time.
///
/// The caller is responsible for calling `tick()` periodically with a
/// monotonic timestamp in milliseconds.
pub struct Watchdog {
    config: WatchdogConfig,
    /// (phase, expected replies) at the last observed change
    last_seen: Option<(WavePhase, usize)>,
    /// When the last change was observed (ms)
    last_progress_at: u64,
    /// Whether the current stall was already reported
    reported: bool,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            last_seen: None,
            last_progress_at: 0,
            reported: false,
        }
    }

    /// Observe `state` at `now_ms`; returns a report when a new stall is detected.
    pub fn tick(&mut self, now_ms: u64, state: &NodeState) -> Option<StallReport> {
        let observed = (state.phase(), state.expected_replies());
        if self.last_seen != Some(observed) {
            self.last_seen = Some(observed);
            self.last_progress_at = now_ms;
            self.reported = false;
            return None;
        }

        if observed.0 != WavePhase::Active || self.reported {
            return None;
        }

        let waited = now_ms.saturating_sub(self.last_progress_at);
        if waited < self.config.stall_after.as_millis() as u64 {
            return None;
        }

        self.reported = true;
        Some(StallReport {
            expected_replies: observed.1,
            waiting_on: state.pending_replies().iter().cloned().collect(),
            stalled_for: Duration::from_millis(waited),
        })
    }
}

//! Routes a decoded inbound message to the matching engine operation.

use crate::error::ProtocolViolation;
use crate::protocol::{Intent, Message};
use crate::state::{Effects, NodeState};
use tracing::debug;

/// Apply one inbound message to `state`.
///
/// This is the single entry point for every externally triggered state
/// transition. It holds no logic of its own beyond choosing the engine.
pub fn dispatch(state: &mut NodeState, msg: &Message) -> Result<Effects, ProtocolViolation> {
    match msg.intent {
        Intent::Position => Ok(state.on_position(msg)),
        Intent::Go => state.on_go(&msg.source, &msg.data),
        Intent::Back => state.on_back(&msg.source, msg.contribution()),
        Intent::Ping => {
            debug!("{} pinged by {}", state.id(), msg.source);
            Ok(Effects::new())
        }
        Intent::Unknown => Err(ProtocolViolation::UnknownIntent {
            peer: msg.source.clone(),
        }),
    }
}

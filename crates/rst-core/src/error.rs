//! Error taxonomy for inbound message handling.
//!
//! None of these are fatal: the runtime logs them and drops the delivery
//! that caused them.

use crate::protocol::DecodeError;
use crate::transport::TransportError;
use crate::NodeId;
use thiserror::Error;

/// A message that decoded fine but makes no sense in the current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Unrecognized intent from {peer}")]
    UnknownIntent { peer: NodeId },

    #[error("Back from {peer} before any parent was assigned")]
    BackWithoutParent { peer: NodeId },

    #[error("Back from {peer} after all expected replies arrived")]
    UnexpectedBack { peer: NodeId },
}

impl ProtocolViolation {
    /// Node that sent the offending message.
    pub fn peer(&self) -> &NodeId {
        match self {
            Self::UnknownIntent { peer }
            | Self::BackWithoutParent { peer }
            | Self::UnexpectedBack { peer } => peer,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode failure: {0}")]
    Decode(#[from] DecodeError),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_names_peer() {
        let peer: NodeId = "8002".parse().unwrap();
        let violation = ProtocolViolation::UnexpectedBack { peer: peer.clone() };
        assert_eq!(violation.peer(), &peer);

        let error = Error::from(violation);
        assert!(error.to_string().starts_with("Protocol violation: Back from 8002"));
    }

    #[test]
    fn test_decode_failure_converts() {
        let error = Error::from(DecodeError::Empty);
        assert!(matches!(error, Error::Decode(DecodeError::Empty)));
    }
}

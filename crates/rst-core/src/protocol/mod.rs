//! Wire protocol shared by the flooding and wave engines.
//!
//! - Typed messages with an explicit intent
//! - Newline-delimited JSON framing

pub mod codec;
pub mod message;

pub use codec::{decode_frame, encode_frame, DecodeError, MAX_FRAME_SIZE};
pub use message::{Intent, Message, ValuePair};

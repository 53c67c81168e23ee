//! Line framing for messages on a byte stream.
//!
//! Each message is a single JSON object terminated by `\n`. A connection may
//! carry any number of frames.

use super::Message;
use thiserror::Error;

/// Maximum frame size (1MB). Larger frames are rejected before parsing.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty frame")]
    Empty,

    #[error("Frame too large ({0} bytes)")]
    TooLarge(usize),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a message as one newline-terminated frame.
pub fn encode_frame(msg: &Message) -> Vec<u8> {
    let mut frame = msg.to_json();
    frame.push(b'\n');
    frame
}

/// Decode one frame. Surrounding whitespace (including the newline) is ignored.
pub fn decode_frame(frame: &[u8]) -> Result<Message, DecodeError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(DecodeError::TooLarge(frame.len()));
    }
    let trimmed = frame.trim_ascii();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(trimmed)?)
}

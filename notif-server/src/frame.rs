//! Notification wire framing.
//!
//! Each message is a 32-bit big-endian length followed by exactly that many
//! bytes of UTF-8 JSON. Inbound messages longer than [`MAX_MESSAGE_SIZE`]
//! or that fail to parse are protocol violations; the session that sent
//! them is closed.

use serde_json::Value;

/// Length prefix size.
pub const HEADER_SIZE: usize = 4;

/// Largest request a client may send.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Framing violation on a notification session.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid message length: {0}")]
    InvalidLength(u32),

    #[error("invalid JSON payload: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Frame a JSON message: `be32(len) ∥ json`.
pub fn encode(message: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Buffered frame decoder for streaming reads.
#[derive(Default)]
pub struct Decoder {
    buf: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed data and extract complete messages.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Value>, FrameError> {
        self.buf.extend_from_slice(data);
        let mut messages = Vec::new();
        let mut offset = 0;

        loop {
            let Some(header) = self.buf.get(offset..offset + HEADER_SIZE) else {
                break;
            };
            let Ok(header) = <[u8; 4]>::try_from(header) else {
                break;
            };
            let length = u32::from_be_bytes(header);
            if length == 0 || length as usize > MAX_MESSAGE_SIZE {
                self.buf.clear();
                return Err(FrameError::InvalidLength(length));
            }
            let body_start = offset + HEADER_SIZE;
            let Some(body) = self.buf.get(body_start..body_start + length as usize) else {
                break;
            };
            let message = match serde_json::from_slice(body) {
                Ok(message) => message,
                Err(err) => {
                    self.buf.clear();
                    return Err(FrameError::Parse(err));
                }
            };
            messages.push(message);
            offset = body_start + length as usize;
        }

        if offset > 0 {
            self.buf.drain(..offset);
        }
        Ok(messages)
    }
}

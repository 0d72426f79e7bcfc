// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Messaging transport capability interface.
//!
//! The benchmark loops need a few capabilities from the transport under
//! test: publish a message, add or remove a listener for a topic, and
//! announce and drain a listening endpoint. Listeners run on a thread owned
//! by the transport.

pub mod unix;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{PayloadError, TransportError};
use crate::types::Topic;

pub use unix::UnixTransport;

/// A published message: a topic plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: Topic, payload: Vec<u8>) -> Self {
        Self { topic, payload }
    }
}

/// Callback invoked for every message delivered on a registered topic.
pub trait Listener: Send + Sync {
    /// Handle one message. An error means the message was dropped; the
    /// transport keeps delivering.
    fn on_receive(&self, message: &Message) -> Result<(), PayloadError>;
}

/// Capability set of a messaging transport.
pub trait Transport: Send + Sync {
    /// Publish `message` to every connected peer.
    fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Deliver messages on `topic` to `listener`.
    fn register_listener(
        &self,
        topic: &Topic,
        listener: Arc<dyn Listener>,
    ) -> Result<(), TransportError>;

    /// Stop delivering `topic` to `listener`. Fails if it was not registered.
    fn unregister_listener(
        &self,
        topic: &Topic,
        listener: &Arc<dyn Listener>,
    ) -> Result<(), TransportError>;

    /// Make the endpoint reachable by publishers. Called once every listener
    /// is registered; transports that are reachable from the start keep the
    /// default.
    fn announce(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Wait, at most `timeout`, until every message already queued for this
    /// endpoint has reached its listeners.
    fn drain(&self, _timeout: Duration) {}
}

/// Largest topic-plus-payload frame accepted on the wire.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 + 2 + Topic::MAX_LEN;

/// Encode `message` as `u16 topic length (LE) | topic | payload`.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, TransportError> {
    let topic = message.topic.as_str().as_bytes();
    let size = 2 + topic.len() + message.payload.len();
    if size > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&(topic.len() as u16).to_le_bytes());
    frame.extend_from_slice(topic);
    frame.extend_from_slice(&message.payload);
    Ok(frame)
}

/// Decode a frame produced by [`encode_frame`]. Returns `None` for frames
/// that are truncated or carry an invalid topic.
pub fn decode_frame(frame: &[u8]) -> Option<Message> {
    let len_bytes: [u8; 2] = frame.get(..2)?.try_into().ok()?;
    let topic_len = u16::from_le_bytes(len_bytes) as usize;
    let topic_bytes = frame.get(2..2 + topic_len)?;
    let topic = Topic::new(std::str::from_utf8(topic_bytes).ok()?).ok()?;
    Some(Message {
        topic,
        payload: frame[2 + topic_len..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_decode_of_encoded_message() {
        let message = Message::new(Topic::for_index(0), b"123.000000001|0|app0|xx".to_vec());
        let frame = encode_frame(&message).unwrap();
        assert_eq!(decode_frame(&frame), Some(message));
    }

    #[test]
    fn test_truncated_frames_rejected() {
        assert_eq!(decode_frame(&[]), None);
        assert_eq!(decode_frame(&[5]), None);
        assert_eq!(decode_frame(&[5, 0, b'/', b'a']), None);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let message = Message::new(Topic::for_index(0), vec![0u8; MAX_FRAME_SIZE]);
        assert!(matches!(
            encode_frame(&message),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}

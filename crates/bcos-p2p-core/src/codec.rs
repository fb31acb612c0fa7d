//! Frame codec boundary.
//!
//! The session knows nothing about the wire format beyond what
//! [`FrameCodec`] tells it: where the next frame ends, its sequence number,
//! and whether it is a request.

use bcos_p2p_proto::{DEFAULT_MAX_FRAME_LEN, P2pMessage, ProtocolError};
use bytes::Bytes;

/// Result of one decode attempt against the accumulated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<M> {
    /// One complete frame; `consumed` bytes at the front of the buffer belong
    /// to it and `consumed > 0`.
    Frame {
        /// Bytes to discard from the front of the buffer
        consumed: usize,
        /// Decoded message
        message: M,
    },
    /// Buffer holds only a partial frame. Nothing consumed.
    NeedMore,
    /// Stream is not framable.
    Error(ProtocolError),
}

/// Stateless message codec used by a session.
pub trait FrameCodec: Send + Sync + 'static {
    /// Message type carried by frames.
    type Message: Send + 'static;

    /// Try to decode one frame from the front of `buf`.
    fn decode(&self, buf: &[u8]) -> Decoded<Self::Message>;

    /// Encode a message into one frame.
    fn encode(&self, message: &Self::Message) -> Result<Bytes, ProtocolError>;

    /// Sequence number used for request/response correlation.
    fn sequence(&self, message: &Self::Message) -> u32;

    /// Request frames are never matched against pending calls.
    fn is_request(&self, message: &Self::Message) -> bool;
}

/// Codec for the BCOS peer-to-peer wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pCodec {
    max_frame_len: usize,
}

impl P2pCodec {
    /// Codec accepting frames up to `max_frame_len` bytes.
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// Largest accepted frame.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for P2pCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec for P2pCodec {
    type Message = P2pMessage;

    fn decode(&self, buf: &[u8]) -> Decoded<P2pMessage> {
        match P2pMessage::decode(buf, self.max_frame_len) {
            Ok(Some((message, consumed))) => Decoded::Frame { consumed, message },
            Ok(None) => Decoded::NeedMore,
            Err(error) => Decoded::Error(error),
        }
    }

    fn encode(&self, message: &P2pMessage) -> Result<Bytes, ProtocolError> {
        message.to_bytes(self.max_frame_len)
    }

    fn sequence(&self, message: &P2pMessage) -> u32 {
        message.seq
    }

    fn is_request(&self, message: &P2pMessage) -> bool {
        message.is_request()
    }
}

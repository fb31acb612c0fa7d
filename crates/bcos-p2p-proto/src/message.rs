//! Peer-to-peer message and its frame codec.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameHeader, ProtocolError, Result};

/// Default upper bound on a single frame, header included.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One framed message exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pMessage {
    /// Protocol id. Positive for requests, negative for responses.
    pub protocol_id: i16,
    /// Packet type within the protocol
    pub packet_type: u16,
    /// Sequence number correlating a response with its request
    pub seq: u32,
    /// Opaque payload
    pub payload: Bytes,
}

impl P2pMessage {
    /// Create a message.
    pub fn new(protocol_id: i16, packet_type: u16, seq: u32, payload: impl Into<Bytes>) -> Self {
        Self { protocol_id, packet_type, seq, payload: payload.into() }
    }

    /// Build the response to `request`: same sequence number and packet type,
    /// protocol id negated.
    pub fn response_to(request: &Self, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol_id: request.protocol_id.wrapping_neg(),
            packet_type: request.packet_type,
            seq: request.seq,
            payload: payload.into(),
        }
    }

    /// Whether this frame is a request (positive protocol id).
    pub fn is_request(&self) -> bool {
        self.protocol_id > 0
    }

    /// Full encoded length of this message.
    pub fn frame_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    ///
    /// # Errors
    ///
    /// `FrameTooLarge` when the frame would exceed `max_frame_len` (or the
    /// 32-bit length field).
    pub fn encode(&self, dst: &mut BytesMut, max_frame_len: usize) -> Result<()> {
        let length = self.frame_len();
        let max = max_frame_len.min(u32::MAX as usize);
        if length > max {
            return Err(ProtocolError::FrameTooLarge { length, max });
        }

        let header = FrameHeader::new(length as u32, self.protocol_id, self.packet_type, self.seq);
        dst.reserve(length);
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a standalone buffer.
    pub fn to_bytes(&self, max_frame_len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.frame_len());
        self.encode(&mut buf, max_frame_len)?;
        Ok(buf.freeze())
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame, and
    /// `Ok(Some((message, consumed)))` with `consumed > 0` otherwise. Bytes
    /// after the frame are left untouched.
    ///
    /// # Errors
    ///
    /// `FrameTooShort`/`FrameTooLarge` when the length field is out of range.
    /// Raised as soon as the header is readable, without waiting for the body.
    pub fn decode(buf: &[u8], max_frame_len: usize) -> Result<Option<(Self, usize)>> {
        let Some(header) = FrameHeader::peek(buf) else {
            return Ok(None);
        };

        let length = header.length();
        if (length as usize) < FrameHeader::SIZE {
            return Err(ProtocolError::FrameTooShort { length, min: FrameHeader::SIZE });
        }
        let length = length as usize;
        if length > max_frame_len {
            return Err(ProtocolError::FrameTooLarge { length, max: max_frame_len });
        }
        if buf.len() < length {
            return Ok(None);
        }

        let payload = Bytes::copy_from_slice(&buf[FrameHeader::SIZE..length]);
        let message = Self {
            protocol_id: header.protocol_id(),
            packet_type: header.packet_type(),
            seq: header.seq(),
            payload,
        };
        Ok(Some((message, length)))
    }
}

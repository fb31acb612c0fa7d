//! Fixed 12-byte frame header.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, I16, U16, U32},
};

/// Frame header as it appears on the wire.
///
/// ```text
///  0               4       6       8               12
///  +---------------+-------+-------+---------------+
///  |    length     | proto | ptype |      seq      |
///  +---------------+-------+-------+---------------+
/// ```
///
/// `length` counts the whole frame, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    length: U32<BigEndian>,
    protocol_id: I16<BigEndian>,
    packet_type: U16<BigEndian>,
    seq: U32<BigEndian>,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 12;

    /// Build a header. `length` is the full frame length.
    pub fn new(length: u32, protocol_id: i16, packet_type: u16, seq: u32) -> Self {
        Self {
            length: U32::new(length),
            protocol_id: I16::new(protocol_id),
            packet_type: U16::new(packet_type),
            seq: U32::new(seq),
        }
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Returns `None` when fewer than [`Self::SIZE`] bytes are available. No
    /// field validation happens here.
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(header, _rest)| header)
    }

    /// Total frame length, header included.
    pub fn length(&self) -> u32 {
        self.length.get()
    }

    /// Protocol id. Positive for requests, negated for responses.
    pub fn protocol_id(&self) -> i16 {
        self.protocol_id.get()
    }

    /// Packet type within the protocol.
    pub fn packet_type(&self) -> u16 {
        self.packet_type.get()
    }

    /// Sequence number.
    pub fn seq(&self) -> u32 {
        self.seq.get()
    }

    /// Raw header bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

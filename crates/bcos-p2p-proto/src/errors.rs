//! Errors raised while framing or unframing messages.

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A frame could not be decoded or encoded.
///
/// Any of these on the read side means the byte stream is no longer aligned to
/// frame boundaries, so the connection cannot recover.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Declared frame length is smaller than the header itself.
    #[error("frame length {length} shorter than {min}-byte header")]
    FrameTooShort {
        /// Length field from the header
        length: u32,
        /// Header size
        min: usize,
    },

    /// Declared frame length exceeds the configured limit.
    #[error("frame length {length} exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Length field from the header (or computed length when encoding)
        length: usize,
        /// Configured limit
        max: usize,
    },

    /// Codec reported progress that does not fit in the buffer it was given.
    #[error("codec consumed {consumed} bytes from a {available}-byte buffer")]
    InvalidConsumption {
        /// Bytes the codec claimed
        consumed: usize,
        /// Bytes actually buffered
        available: usize,
    },
}

//! Wire format for FISCO BCOS peer-to-peer traffic.
//!
//! Every frame is a fixed 12-byte big-endian header followed by an opaque
//! payload. The header carries the total frame length, the protocol id that
//! routes the payload to a subsystem (consensus, sync, AMOP, ...), a packet
//! type within that protocol, and the sequence number that correlates a
//! response with its request.
//!
//! Request frames carry a positive protocol id; the matching response carries
//! the same id negated. The session layer relies on exactly two facts from
//! this crate: where a frame ends, and whether it is a request.
//!
//! # Security
//!
//! Headers are parsed through compile-time verified layouts via `zerocopy`.
//! Frame length is bounded by a caller-supplied limit (16 MiB by default) so a
//! hostile peer cannot make the reader buffer unbounded input.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod header;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use header::FrameHeader;
pub use message::{DEFAULT_MAX_FRAME_LEN, P2pMessage};

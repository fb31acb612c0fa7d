//! Session errors and disconnect reasons.

use std::{fmt, time::Duration};

use bcos_p2p_proto::ProtocolError;

use crate::session::SessionState;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Local side asked for the disconnect
    Requested,
    /// Socket read or write failed, or the peer closed the stream
    TransportError,
    /// Inbound bytes could not be framed
    ProtocolError,
    /// Another session to the same peer already exists
    DuplicatePeer,
    /// Local node is shutting down
    ClientQuit,
    /// Peer stopped answering keepalives
    PingTimeout,
    /// Peer offers nothing useful
    UselessPeer,
    /// Peer limit reached
    TooManyPeers,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Requested => "disconnect was requested",
            Self::TransportError => "low-level TCP communication error",
            Self::ProtocolError => "data format error",
            Self::DuplicatePeer => "peer had already connected",
            Self::ClientQuit => "peer is exiting",
            Self::PingTimeout => "ping timeout",
            Self::UselessPeer => "peer had no use for this node",
            Self::TooManyPeers => "peer had too many connections",
        };
        f.write_str(text)
    }
}

/// Failure delivered to a response callback or the message handler.
///
/// `Clone` because a single teardown fans the same failure out to every
/// pending call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Send attempted on a session that is not active
    #[error("session inactive")]
    Inactive,

    /// Inbound frame could not be decoded, or an outbound one encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No response within the call's timeout
    #[error("request {seq} timed out after {after:?}")]
    Timeout {
        /// Sequence number of the request
        seq: u32,
        /// Configured timeout
        after: Duration,
    },

    /// Session torn down while the call was outstanding
    #[error("disconnected: {0}")]
    Disconnected(DisconnectReason),

    /// Sequence number is already waiting for a response
    #[error("sequence number {0} already has a pending call")]
    DuplicateSequence(u32),

    /// Pending-call limit reached
    #[error("too many pending calls (limit {limit})")]
    TooManyPending {
        /// Configured limit
        limit: usize,
    },

    /// Operation not valid in the session's current state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// State at the time of the call
        state: SessionState,
        /// Operation attempted
        operation: &'static str,
    },
}

impl SessionError {
    /// Stable numeric code reported to upper layers.
    ///
    /// Duplicate-peer teardown has its own code so callers can tell it apart
    /// from an ordinary disconnect.
    pub fn code(&self) -> i32 {
        match self {
            Self::Inactive => -1,
            Self::Protocol(_) => 1,
            Self::Timeout { .. } => 2,
            Self::Disconnected(DisconnectReason::DuplicatePeer) => 4,
            Self::Disconnected(_) => 3,
            Self::DuplicateSequence(_) => 5,
            Self::TooManyPending { .. } => 6,
            Self::InvalidState { .. } => 7,
        }
    }
}

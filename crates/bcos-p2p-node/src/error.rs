//! Node errors.

use std::io;

use bcos_p2p_core::SessionError;

/// Failure that ends a node run.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Binding, accepting, or connecting failed
    #[error("network I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Session refused to start or failed outright
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Every dialled request failed
    #[error("all {sent} requests failed")]
    NoResponses {
        /// Requests sent
        sent: u32,
    },
}

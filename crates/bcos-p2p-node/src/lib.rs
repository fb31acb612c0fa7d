//! Minimal BCOS peer node.
//!
//! `listen` accepts TCP peers and echoes every request back as its response;
//! `dial` connects to a peer, sends numbered probes, and reports round-trip
//! times. Both run the production session stack: Tokio host and executor
//! with a [`bcos_p2p_core::StreamSocket`] over TCP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod dial;
pub mod echo;
pub mod error;
pub mod node;

pub use cli::{Args, Command};
pub use dial::{DialOptions, DialReport, run_probes};
pub use echo::install_echo;
pub use error::NodeError;
pub use node::Node;

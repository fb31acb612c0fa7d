//! Command-line arguments.

use std::net::SocketAddr;

use bcos_p2p_core::SessionConfig;
use bcos_p2p_proto::DEFAULT_MAX_FRAME_LEN;
use clap::{Parser, Subcommand};

/// Listen for or dial BCOS peer sessions over TCP.
#[derive(Parser, Debug)]
#[command(name = "bcos-p2p-node", version, about)]
pub struct Args {
    /// What to run
    #[command(subcommand)]
    pub command: Command,

    /// Bytes requested from the socket per read
    #[arg(long, global = true, default_value_t = 1024)]
    pub read_buffer_len: usize,

    /// Upper bound on calls waiting for a response, per session
    #[arg(long, global = true, default_value_t = 8192)]
    pub max_pending_calls: usize,

    /// Largest accepted frame, header included
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,
}

/// Node mode.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Accept connections and echo every request back as its response
    Listen {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:30300")]
        addr: SocketAddr,
    },
    /// Connect, send requests, and report round-trip times
    Dial {
        /// Peer to connect to
        #[arg(long, default_value = "127.0.0.1:30300")]
        addr: SocketAddr,

        /// Requests to send
        #[arg(long, default_value_t = 10)]
        count: u32,

        /// Per-request timeout in milliseconds (0 waits forever)
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Payload bytes per request
        #[arg(long, default_value_t = 64)]
        payload_len: usize,
    },
}

impl Args {
    /// Session tuning from the global flags.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            read_buffer_len: self.read_buffer_len,
            max_pending_calls: self.max_pending_calls,
        }
    }
}

//! Peer-to-peer session layer for FISCO BCOS nodes.
//!
//! A [`Session`] turns one authenticated byte stream into framed,
//! correlated request/response traffic. It owns the read loop, the outbound
//! write queue, sequence-number correlation with timeout cancellation, and
//! teardown.
//!
//! # Architecture
//!
//! ```text
//!   socket ──read──> inbound buffer ──codec loop──> frame
//!                                                    │
//!                         response? ┌────────────────┴──────────┐ request / unmatched
//!                                   ▼                           ▼
//!                           ResponseRegistry              message handler
//!                                   │                           │
//!                                   └──────> TaskExecutor <─────┘
//!
//!   send() ──encode──> WriteQueue ──pump (one write in flight)──> socket
//! ```
//!
//! Application code never runs on the I/O path: every response callback,
//! timeout, and handler invocation is handed to a [`TaskExecutor`].
//!
//! Everything outside the session (sockets, timers, executor, network
//! liveness, wire codec) sits behind a trait so the same state machine runs
//! against Tokio TCP in production and against scripted doubles in tests.
//!
//! # Components
//!
//! - [`session`]: Connection state machine, read loop, write pump
//! - [`registry`]: Pending calls keyed by sequence number
//! - [`write_queue`]: FIFO of outbound frames with an in-flight flag
//! - [`codec`]: Frame codec boundary and the BCOS wire codec
//! - [`host`]: Host, timer, and executor boundary plus Tokio implementations
//! - [`socket`]: Socket boundary plus an adapter for any async stream
//! - [`factory`]: Builds sessions from shared host resources
//! - [`config`]: Session and per-call options
//! - [`error`]: Session errors and disconnect reasons

pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod host;
pub mod registry;
pub mod session;
pub mod socket;
pub mod write_queue;

pub use codec::{Decoded, FrameCodec, P2pCodec};
pub use config::{CallOptions, SessionConfig};
pub use error::{DisconnectReason, SessionError};
pub use factory::SessionFactory;
pub use host::{Host, Task, TaskExecutor, Timer, TokioExecutor, TokioHost};
pub use registry::{PendingCall, ResponseCallback, ResponseRegistry};
pub use session::{MessageHandler, ReadProgress, Session, SessionState};
pub use socket::{SessionSocket, StreamSocket};
pub use write_queue::{QueuedWrite, WriteQueue};

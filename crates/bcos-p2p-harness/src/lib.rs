//! Deterministic harness for session-layer testing.
//!
//! Test doubles for every boundary the session consumes, so tests decide
//! exactly when callbacks run, when timers fire, what the socket delivers,
//! and whether a write succeeds. Plus turmoil helpers for running real
//! sessions over simulated TCP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod manual_executor;
pub mod manual_host;
pub mod rig;
pub mod scripted_socket;
pub mod sim;

pub use manual_executor::ManualExecutor;
pub use manual_host::{ManualHost, ManualTimer};
pub use rig::{HandlerEvents, Rig, settle};
pub use scripted_socket::ScriptedSocket;
pub use sim::SimNode;

//! Dialling side: fire requests and measure round trips.

use std::time::Duration;

use bcos_p2p_core::{CallOptions, P2pCodec, Session};
use bcos_p2p_proto::P2pMessage;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Protocol id used for probe requests.
pub const PROBE_PROTOCOL_ID: i16 = 1;

/// Packet type used for probe requests.
pub const PROBE_PACKET_TYPE: u16 = 0x01;

/// What `dial` sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialOptions {
    /// Requests to send, one at a time
    pub count: u32,
    /// Per-request timeout; zero waits forever
    pub timeout: Duration,
    /// Payload bytes per request
    pub payload_len: usize,
}

/// Outcome of a dial run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialReport {
    /// Requests sent
    pub sent: u32,
    /// Round trips of the requests that were answered
    pub round_trips: Vec<Duration>,
    /// Requests that failed (timeout, disconnect, ...)
    pub failed: u32,
}

impl DialReport {
    /// Answered requests.
    pub fn succeeded(&self) -> u32 {
        self.round_trips.len() as u32
    }

    /// Fastest round trip.
    pub fn min(&self) -> Option<Duration> {
        self.round_trips.iter().min().copied()
    }

    /// Slowest round trip.
    pub fn max(&self) -> Option<Duration> {
        self.round_trips.iter().max().copied()
    }

    /// Mean round trip.
    pub fn mean(&self) -> Option<Duration> {
        if self.round_trips.is_empty() {
            return None;
        }
        let total: Duration = self.round_trips.iter().sum();
        Some(total / self.succeeded())
    }
}

/// Probe request number `seq`.
pub fn probe(seq: u32, payload_len: usize) -> P2pMessage {
    let payload = Bytes::from(vec![seq as u8; payload_len]);
    P2pMessage::new(PROBE_PROTOCOL_ID, PROBE_PACKET_TYPE, seq, payload)
}

/// Send `options.count` probes with sequence numbers `1..=count`, waiting
/// for each before the next.
///
/// Stops early once the session is no longer active.
pub async fn run_probes(session: &Session<P2pCodec>, options: DialOptions) -> DialReport {
    let call = CallOptions::with_timeout(options.timeout);
    let mut report = DialReport::default();

    for seq in 1..=options.count {
        if !session.is_active() {
            warn!(sent = report.sent, "session went inactive, stopping");
            break;
        }

        let started = Instant::now();
        report.sent += 1;
        match session.request(probe(seq, options.payload_len), call).await {
            Ok(response) if response.payload.len() == options.payload_len => {
                let rtt = started.elapsed();
                debug!(seq, ?rtt, "probe answered");
                report.round_trips.push(rtt);
            },
            Ok(response) => {
                warn!(seq, bytes = response.payload.len(), "probe answered with wrong payload");
                report.failed += 1;
            },
            Err(error) => {
                warn!(seq, %error, "probe failed");
                report.failed += 1;
            },
        }
    }

    report
}

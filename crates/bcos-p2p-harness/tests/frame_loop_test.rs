//! Inbound frame loop tests.
//!
//! Bytes arrive in arbitrary chunks; the session must dispatch every complete
//! frame in order, keep partial frames buffered, route responses to their
//! callbacks and everything else to the handler, and stop reading on a
//! framing error.

use std::sync::Arc;

use bcos_p2p_core::{
    CallOptions, DisconnectReason, ReadProgress, SessionConfig, SessionError, SessionState,
};
use bcos_p2p_harness::{Rig, settle};
use bcos_p2p_proto::{DEFAULT_MAX_FRAME_LEN, FrameHeader, P2pMessage, ProtocolError};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use proptest::prelude::*;

fn request(seq: u32, payload: &[u8]) -> P2pMessage {
    P2pMessage::new(2, 0x21, seq, Bytes::copy_from_slice(payload))
}

fn wire(message: &P2pMessage) -> Bytes {
    message.to_bytes(DEFAULT_MAX_FRAME_LEN).unwrap()
}

fn stream(messages: &[P2pMessage]) -> Bytes {
    let mut buf = BytesMut::new();
    for message in messages {
        message.encode(&mut buf, DEFAULT_MAX_FRAME_LEN).unwrap();
    }
    buf.freeze()
}

#[tokio::test]
async fn complete_frames_dispatch_and_partial_tail_waits() {
    let rig = Rig::new();
    let events = rig.record_handler();
    let rig = rig.started();

    let messages: Vec<_> = (1..=4).map(|seq| request(seq, b"block-sync")).collect();
    let bytes = stream(&messages);
    let split = bytes.len() - 5;

    rig.socket.feed(bytes.slice(..split));
    settle().await;
    rig.executor.run_all();

    let seen: Vec<_> = events.lock().iter().map(|e| e.as_ref().unwrap().seq).collect();
    assert_eq!(seen, vec![1, 2, 3]);

    rig.socket.feed(bytes.slice(split..));
    settle().await;
    rig.executor.run_all();

    let seen: Vec<_> = events.lock().iter().map(|e| e.as_ref().unwrap().clone()).collect();
    assert_eq!(seen, messages);
}

#[tokio::test]
async fn tiny_read_buffer_still_reassembles_frames() {
    let config = SessionConfig { read_buffer_len: 1, ..SessionConfig::default() };
    let rig = Rig::with_config(config);
    let events = rig.record_handler();
    let rig = rig.started();

    let messages = vec![request(1, b"a"), request(2, b""), request(3, &[0xAB; 300])];
    rig.socket.feed(stream(&messages));
    for _ in 0..64 {
        settle().await;
        rig.executor.run_all();
        if events.lock().len() == messages.len() {
            break;
        }
    }

    let seen: Vec<_> = events.lock().iter().map(|e| e.as_ref().unwrap().clone()).collect();
    assert_eq!(seen, messages);
}

#[tokio::test]
async fn framing_error_halts_reads_without_dropping() {
    let rig = Rig::new();
    let events = rig.record_handler();
    let rig = rig.started();

    let good = request(1, b"ok");
    let mut bytes = BytesMut::from(&wire(&good)[..]);
    bytes.extend_from_slice(&FrameHeader::new(4, 1, 0, 2).to_bytes());
    rig.socket.feed(bytes.freeze());
    settle().await;
    rig.executor.run_all();

    assert_eq!(
        *events.lock(),
        vec![
            Ok(good),
            Err(SessionError::Protocol(ProtocolError::FrameTooShort {
                length: 4,
                min: FrameHeader::SIZE
            })),
        ]
    );

    // No further read is armed
    rig.socket.feed(wire(&request(3, b"late")));
    settle().await;
    rig.executor.run_all();
    assert_eq!(events.lock().len(), 2);

    // Dropping is the handler's call
    assert_eq!(rig.session.state(), SessionState::Active);
}

#[tokio::test]
async fn handler_may_drop_on_framing_error() {
    let rig = Rig::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    rig.session.set_message_handler(move |session, event| {
        if let Err(SessionError::Protocol(_)) = &event {
            session.disconnect(DisconnectReason::ProtocolError);
        }
        sink.lock().push(event);
    });
    let rig = rig.started();

    let oversized = FrameHeader::new(DEFAULT_MAX_FRAME_LEN as u32 + 1, 1, 0, 9);
    rig.socket.feed(Bytes::copy_from_slice(&oversized.to_bytes()));
    settle().await;
    rig.executor.run_all();

    assert_eq!(rig.session.state(), SessionState::Closed);
    assert_eq!(
        *events.lock(),
        vec![
            Err(SessionError::Protocol(ProtocolError::FrameTooLarge {
                length: DEFAULT_MAX_FRAME_LEN + 1,
                max: DEFAULT_MAX_FRAME_LEN
            })),
            Err(SessionError::Disconnected(DisconnectReason::ProtocolError)),
        ]
    );
}

#[tokio::test]
async fn responses_route_to_callbacks_and_requests_to_handler() {
    let rig = Rig::new();
    let events = rig.record_handler();
    let rig = rig.started();

    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    let outbound = request(9, b"get-block");
    rig.session.send(outbound.clone(), CallOptions::from_millis(1_000), move |result| {
        *slot.lock() = Some(result);
    });

    // A peer request that happens to reuse the sequence number is not a reply
    let peer_request = request(9, b"peer-asks");
    rig.socket.feed(wire(&peer_request));
    settle().await;
    rig.executor.run_all();

    assert_eq!(*events.lock(), vec![Ok(peer_request)]);
    assert!(outcome.lock().is_none());
    assert_eq!(rig.session.pending_calls(), 1);

    let response = P2pMessage::response_to(&outbound, &b"block"[..]);
    rig.socket.feed(wire(&response));
    settle().await;

    // Resolved but not yet delivered: callbacks only run on the executor
    assert_eq!(rig.session.pending_calls(), 0);
    assert!(outcome.lock().is_none());

    rig.executor.run_all();
    assert_eq!(*outcome.lock(), Some(Ok(response)));
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn unmatched_response_goes_to_handler() {
    let rig = Rig::new();
    let events = rig.record_handler();
    let rig = rig.started();

    let stray = P2pMessage::response_to(&request(77, b""), &b"stray"[..]);
    rig.socket.feed(wire(&stray));
    settle().await;
    rig.executor.run_all();

    assert_eq!(*events.lock(), vec![Ok(stray)]);
}

#[tokio::test]
async fn missing_handler_drops_unsolicited_frames() {
    let rig = Rig::new().started();

    rig.socket.feed(wire(&request(1, b"nobody-listens")));
    settle().await;

    assert_eq!(rig.executor.pending(), 0);
    assert_eq!(rig.session.state(), SessionState::Active);
}

#[tokio::test]
async fn read_complete_reports_progress() {
    let rig = Rig::new();
    let events = rig.record_handler();
    let rig = rig.started();

    let bytes = wire(&request(5, b"direct"));
    assert_eq!(rig.session.on_read_complete(&bytes[..3]), ReadProgress::NeedMore);
    assert_eq!(rig.session.on_read_complete(&bytes[3..]), ReadProgress::NeedMore);

    let bad = FrameHeader::new(0, 1, 0, 6).to_bytes();
    assert_eq!(rig.session.on_read_complete(&bad), ReadProgress::Halted);

    rig.executor.run_all();
    assert_eq!(events.lock().len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_any_chunking_dispatches_every_frame_in_order(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..12),
        cuts in prop::collection::vec(1usize..40, 1..32),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let rig = Rig::new();
            let events = rig.record_handler();
            let rig = rig.started();

            let messages: Vec<_> = payloads
                .iter()
                .enumerate()
                .map(|(seq, payload)| request(seq as u32, payload))
                .collect();
            let bytes = stream(&messages);

            let mut offset = 0;
            let mut cut = cuts.iter().cycle();
            while offset < bytes.len() {
                let end = (offset + cut.next().copied().unwrap_or(1)).min(bytes.len());
                prop_assert_eq!(rig.session.on_read_complete(&bytes[offset..end]), ReadProgress::NeedMore);
                offset = end;
            }

            rig.executor.run_all();
            let seen: Vec<_> = events.lock().iter().map(|e| e.as_ref().unwrap().clone()).collect();
            prop_assert_eq!(seen, messages);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn framing_error_on_idle_session_is_not_reported() {
    let rig = Rig::new();
    let events = rig.record_handler();

    let bad = FrameHeader::new(4, 1, 0, 0).to_bytes();
    assert_eq!(rig.session.on_read_complete(&bad), ReadProgress::Halted);

    assert_eq!(rig.executor.pending(), 0);
    rig.executor.run_all();
    assert!(events.lock().is_empty());
    assert_eq!(rig.session.state(), SessionState::Idle);
}

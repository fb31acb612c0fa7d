//! Fuzz the frame decoder with arbitrary bytes.
//!
//! Decoding must never panic, must never claim more bytes than it was given,
//! and any frame it accepts must re-encode to the exact bytes consumed.

#![no_main]

use bcos_p2p_proto::{FrameHeader, P2pMessage};
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

const MAX_FRAME_LEN: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    match P2pMessage::decode(data, MAX_FRAME_LEN) {
        Ok(Some((message, consumed))) => {
            assert!(consumed >= FrameHeader::SIZE);
            assert!(consumed <= data.len());
            assert_eq!(message.frame_len(), consumed);

            let mut buf = BytesMut::new();
            message.encode(&mut buf, MAX_FRAME_LEN).unwrap();
            assert_eq!(&buf[..], &data[..consumed]);
        },
        Ok(None) => {
            if let Some(header) = FrameHeader::peek(data) {
                assert!(data.len() < header.length() as usize);
            }
        },
        Err(_) => {},
    }
});

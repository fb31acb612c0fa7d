//! Fuzz the codec loop the session runs over its inbound buffer.
//!
//! The first byte picks a chunk size; the rest is fed through `P2pCodec` in
//! chunks the way reads would deliver it. Every decoded frame must consume
//! at least one byte, and decoding the whole buffer at once must agree with
//! decoding it chunk by chunk.

#![no_main]

use bcos_p2p_core::{Decoded, FrameCodec, P2pCodec};
use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;

fn drain(codec: &P2pCodec, buf: &mut BytesMut, out: &mut Vec<u32>) -> bool {
    loop {
        match codec.decode(&buf[..]) {
            Decoded::Frame { consumed, message } => {
                assert!(consumed > 0 && consumed <= buf.len());
                buf.advance(consumed);
                out.push(codec.sequence(&message));
            },
            Decoded::NeedMore => return true,
            Decoded::Error(_) => return false,
        }
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);
    let codec = P2pCodec::new(64 * 1024);

    let mut whole = BytesMut::from(rest);
    let mut expected = Vec::new();
    let whole_ok = drain(&codec, &mut whole, &mut expected);

    let mut chunked = BytesMut::new();
    let mut seen = Vec::new();
    let mut chunked_ok = true;
    for piece in rest.chunks(chunk) {
        chunked.extend_from_slice(piece);
        if !drain(&codec, &mut chunked, &mut seen) {
            chunked_ok = false;
            break;
        }
    }

    assert_eq!(whole_ok, chunked_ok);
    assert_eq!(expected, seen);
});

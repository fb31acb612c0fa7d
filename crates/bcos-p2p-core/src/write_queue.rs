//! Outbound frame queue for one connection.
//!
//! Strict FIFO. The `writing` flag lives under the same lock as the queue so
//! "is a write in flight" and "take the next frame" are decided together; the
//! lock is never held across the socket write itself.

use std::{collections::VecDeque, time::Instant};

use bytes::Bytes;
use parking_lot::Mutex;

/// One encoded frame waiting to be written.
#[derive(Debug, Clone)]
pub struct QueuedWrite {
    /// Encoded frame
    pub buffer: Bytes,
    /// When the frame was queued
    pub enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueuedWrite>,
    writing: bool,
}

/// FIFO of outbound frames with a single in-flight slot.
#[derive(Debug, Default)]
pub struct WriteQueue {
    state: Mutex<QueueState>,
}

impl WriteQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Returns the queue depth after the push.
    pub fn push(&self, buffer: Bytes) -> usize {
        let mut state = self.state.lock();
        state.entries.push_back(QueuedWrite { buffer, enqueued_at: Instant::now() });
        state.entries.len()
    }

    /// Claim the in-flight slot and the head frame.
    ///
    /// `None` when a write is already in flight or the queue is empty; in the
    /// empty case the slot stays free.
    pub fn begin_write(&self) -> Option<QueuedWrite> {
        let mut state = self.state.lock();
        if state.writing {
            return None;
        }
        Self::claim_next(&mut state)
    }

    /// Release the in-flight slot after a successful write and immediately
    /// try to claim the next frame.
    pub fn complete_write(&self) -> Option<QueuedWrite> {
        let mut state = self.state.lock();
        state.writing = false;
        Self::claim_next(&mut state)
    }

    fn claim_next(state: &mut QueueState) -> Option<QueuedWrite> {
        let next = state.entries.pop_front();
        state.writing = next.is_some();
        next
    }

    /// Discard everything not yet written. Returns the number discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.entries.len();
        state.entries.clear();
        discarded
    }

    /// Frames waiting (not counting one in flight).
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a write is in flight.
    pub fn is_writing(&self) -> bool {
        self.state.lock().writing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: &'static [u8]) -> Bytes {
        Bytes::from_static(tag)
    }

    #[test]
    fn single_slot_in_flight() {
        let queue = WriteQueue::new();
        queue.push(frame(b"a"));
        queue.push(frame(b"b"));

        let first = queue.begin_write().unwrap();
        assert_eq!(first.buffer, frame(b"a"));
        assert!(queue.is_writing());

        // Second pump attempt while "a" is in flight gets nothing.
        assert!(queue.begin_write().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn complete_hands_out_next_in_fifo_order() {
        let queue = WriteQueue::new();
        for tag in [b"a", b"b", b"c"] {
            queue.push(frame(tag));
        }

        let mut written = Vec::new();
        let mut next = queue.begin_write();
        while let Some(entry) = next {
            written.push(entry.buffer);
            next = queue.complete_write();
        }

        assert_eq!(written, vec![frame(b"a"), frame(b"b"), frame(b"c")]);
        assert!(!queue.is_writing());
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_leaves_slot_free() {
        let queue = WriteQueue::new();
        assert!(queue.begin_write().is_none());
        assert!(!queue.is_writing());

        queue.push(frame(b"x"));
        assert!(queue.begin_write().is_some());
    }

    #[test]
    fn clear_discards_waiting_frames_only() {
        let queue = WriteQueue::new();
        queue.push(frame(b"a"));
        queue.push(frame(b"b"));
        queue.push(frame(b"c"));

        let _in_flight = queue.begin_write().unwrap();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.complete_write().is_none());
    }
}

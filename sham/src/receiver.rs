//! In-order receive-side state machine.
//!
//! [`Receiver`] implements the receiving half of the byte stream:
//!
//! - Only the **next expected** segment is accepted (`seq_num == next_expected_seq`).
//! - Anything else is **silently discarded**: no buffering of future
//!   segments, no duplicate ACK.  Recovery relies entirely on the sender's
//!   retransmission timer.
//! - Every accepted segment is answered with a **cumulative ACK** built by
//!   [`Receiver::ack_segment`].
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (same pattern as [`crate::sender::Sender`]).

use crate::packet::{Flags, Segment};

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    /// Next byte offset expected from the peer.
    ///
    /// Advances by `payload.len()` each time an in-order segment is accepted.
    pub next_expected_seq: u32,

    /// In-order payload bytes, append-only.
    buffer: Vec<u8>,

    /// Advertised receive window (constant; the buffer grows on demand).
    window: u16,
}

impl Receiver {
    /// Create a receiver expecting `next_expected_seq` as the first data offset.
    pub fn new(next_expected_seq: u32, window: u16) -> Self {
        Self {
            next_expected_seq,
            buffer: Vec::new(),
            window,
        }
    }

    /// Process an inbound data segment.
    ///
    /// Returns `true` if the segment was **accepted** and its payload appended
    /// to the buffer.  Returns `false` for any other offset; the caller must
    /// not acknowledge a rejected segment.
    pub fn on_segment(&mut self, seq: u32, payload: &[u8]) -> bool {
        if seq != self.next_expected_seq {
            return false;
        }
        let Some(next) = self.next_expected_seq.checked_add(payload.len() as u32) else {
            return false;
        };
        self.buffer.extend_from_slice(payload);
        self.next_expected_seq = next;
        true
    }

    /// Cumulative ACK number (`next_expected_seq`).
    pub fn ack_number(&self) -> u32 {
        self.next_expected_seq
    }

    /// Advertised receive window.
    pub fn window_size(&self) -> u16 {
        self.window
    }

    /// The pure ACK segment announcing the current cumulative position.
    pub fn ack_segment(&self) -> Segment {
        Segment::control(0, self.ack_number(), Flags::ACK, self.window_size())
    }

    /// Bytes accepted so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the receiver, returning every accepted byte in order.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = Receiver::new(101, 65535);
        assert_eq!(r.next_expected_seq, 101);
        assert!(r.is_empty());
        assert_eq!(r.ack_number(), 101);
    }

    #[test]
    fn in_order_segment_accepted() {
        let mut r = Receiver::new(100, 65535);
        assert!(r.on_segment(100, b"hello"));
        assert_eq!(r.next_expected_seq, 105);
        assert_eq!(r.bytes(), b"hello");
    }

    #[test]
    fn future_segment_discarded() {
        let mut r = Receiver::new(100, 65535);
        assert!(!r.on_segment(110, b"future"));
        assert_eq!(r.next_expected_seq, 100);
        assert!(r.is_empty());
    }

    #[test]
    fn duplicate_segment_discarded() {
        let mut r = Receiver::new(100, 65535);
        assert!(r.on_segment(100, b"hello"));
        assert!(!r.on_segment(100, b"hello"));
        assert_eq!(r.len(), 5);
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn gap_is_filled_only_by_retransmission() {
        let mut r = Receiver::new(0, 65535);
        assert!(!r.on_segment(5, b"world"));
        assert!(r.on_segment(0, b"hello"));
        assert!(r.on_segment(5, b"world"));
        assert_eq!(r.into_bytes(), b"helloworld");
    }

    #[test]
    fn ack_segment_carries_cumulative_position_and_window() {
        let mut r = Receiver::new(0, 4096);
        r.on_segment(0, &[7u8; 1024]);
        let ack = r.ack_segment();
        assert!(ack.has_exact_flags(Flags::ACK));
        assert_eq!(ack.header.ack_num, 1024);
        assert_eq!(ack.header.window_size, 4096);
        assert!(ack.payload.is_empty());
    }

    #[test]
    fn segment_crossing_sequence_limit_rejected() {
        let mut r = Receiver::new(u32::MAX - 2, 65535);
        assert!(!r.on_segment(u32::MAX - 2, b"abcde"));
        assert_eq!(r.next_expected_seq, u32::MAX - 2);
    }
}

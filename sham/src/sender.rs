//! Sliding-window send-side state machine.
//!
//! [`Sender`] tracks the outbound byte stream of one connection: which bytes
//! have been queued, which are cumulatively acknowledged, and the in-flight
//! segments that may need retransmission.  It does **not** touch the socket;
//! [`crate::connection::Connection`] drives it and owns the I/O loop.
//!
//! # Sequence-number layout
//!
//! ```text
//!  window_base        next_seq_num
//!      │                    │
//!  ────┼────────────────────┼──────────────────▶ byte offsets
//!      │ <── in flight ───▶ │ <── not yet read ──▶
//! ```
//!
//! # Protocol contract
//!
//! - At most `window_slots × max_payload` bytes are unacknowledged at once.
//!   The peer's advertised window is recorded but does not shrink this
//!   limit; flow control is not enforced.
//! - ACKs are **cumulative** and only ever move `window_base` forward.
//! - Each expired segment is resent on its own, unchanged.  A segment that
//!   has already been resent `max_retries` times aborts the transfer.
//! - Offsets are plain `u32` byte counters with no wrap-around: one
//!   connection can carry at most ~4 GiB.

use tokio::time::Instant;

use crate::config::Config;
use crate::connection::ConnError;
use crate::packet::Segment;
use crate::timer::RetryPolicy;
use crate::window::SendWindow;

/// Counters describing one transfer, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Distinct data segments sent (first transmissions only).
    pub segments_sent: u64,
    /// Timeout-driven retransmissions.
    pub retransmissions: u64,
    /// ACK segments processed.
    pub acks_received: u64,
    /// Payload bytes queued.
    pub bytes_sent: u64,
}

/// Send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    /// Next byte offset not yet queued.
    pub next_seq_num: u32,
    /// Smallest byte offset not yet cumulatively acknowledged.
    pub window_base: u32,
    /// Last receive window advertised by the peer.
    pub peer_window: u16,
    window: SendWindow,
    window_bytes: u32,
    policy: RetryPolicy,
    advertised_window: u16,
    stats: SenderStats,
}

impl Sender {
    /// Create a sender whose first data byte will carry offset `initial_seq`.
    pub fn new(initial_seq: u32, config: &Config) -> Self {
        Self {
            next_seq_num: initial_seq,
            window_base: initial_seq,
            peer_window: u16::MAX,
            window: SendWindow::new(initial_seq, config.window_slots, config.max_payload),
            window_bytes: config.window_bytes(),
            policy: RetryPolicy::from(config),
            advertised_window: config.advertised_window,
            stats: SenderStats::default(),
        }
    }

    /// Bytes sent but not yet acknowledged.
    pub fn outstanding(&self) -> u32 {
        self.next_seq_num.saturating_sub(self.window_base)
    }

    /// `true` while the local window has room for another segment.
    pub fn can_fill(&self) -> bool {
        self.outstanding() < self.window_bytes
    }

    /// `true` once every queued byte has been acknowledged.
    pub fn is_drained(&self) -> bool {
        self.window_base >= self.next_seq_num
    }

    /// Number of unacknowledged segments in the window.
    pub fn in_flight(&self) -> usize {
        self.window.in_flight()
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Build the next data segment for `payload`, record it as sent at `now`,
    /// and advance `next_seq_num`.
    ///
    /// The caller transmits the returned segment.
    pub fn queue(&mut self, payload: Vec<u8>, now: Instant) -> Result<Segment, ConnError> {
        let len = payload.len() as u32;
        let next = self
            .next_seq_num
            .checked_add(len)
            .ok_or(ConnError::SequenceSpaceExhausted {
                next_seq: self.next_seq_num,
            })?;

        let segment = Segment::data(self.next_seq_num, self.advertised_window, payload);
        self.window.insert(segment.clone(), now);
        self.next_seq_num = next;
        self.stats.segments_sent += 1;
        self.stats.bytes_sent += u64::from(len);
        Ok(segment)
    }

    /// Build a bare data segment that bypasses the window entirely.
    ///
    /// Both `next_seq_num` and `window_base` move past it: nothing waits for
    /// an acknowledgement and nothing will be retransmitted.
    pub fn send_unreliable(&mut self, payload: Vec<u8>) -> Result<Segment, ConnError> {
        let next = self
            .next_seq_num
            .checked_add(payload.len() as u32)
            .ok_or(ConnError::SequenceSpaceExhausted {
                next_seq: self.next_seq_num,
            })?;
        let segment = Segment::data(self.next_seq_num, self.advertised_window, payload);
        self.next_seq_num = next;
        self.window_base = self.window_base.max(next);
        Ok(segment)
    }

    /// Process a cumulative ACK carrying `ack_num` and the peer's window.
    ///
    /// Returns `true` when `window_base` advanced.
    pub fn on_ack(&mut self, ack_num: u32, peer_window: u16) -> bool {
        self.stats.acks_received += 1;
        self.peer_window = peer_window;
        if ack_num <= self.window_base {
            return false;
        }
        self.window_base = ack_num;
        self.window.release_through(ack_num);
        true
    }

    /// Collect every in-flight segment whose RTO has expired at `now`.
    ///
    /// Each returned segment has had its retry counter incremented and its
    /// send time reset; the caller must transmit all of them.  Fails with
    /// [`ConnError::RetriesExhausted`] when an expired segment has no
    /// retries left.
    pub fn due_retransmits(&mut self, now: Instant) -> Result<Vec<Segment>, ConnError> {
        let mut due = Vec::new();
        for offset in self.window.pending_offsets() {
            if offset < self.window_base || offset >= self.next_seq_num {
                continue;
            }
            let Some(slot) = self.window.get_mut(offset) else {
                continue;
            };
            if !self.policy.is_expired(slot.sent_at, now) {
                continue;
            }
            if self.policy.is_exhausted(slot.retries) {
                return Err(ConnError::RetriesExhausted {
                    seq: offset,
                    retries: slot.retries,
                });
            }
            slot.retries += 1;
            slot.sent_at = now;
            self.stats.retransmissions += 1;
            due.push(slot.segment.clone());
        }
        Ok(due)
    }

    /// When the oldest in-flight segment falls due, if any is in flight.
    pub fn next_retransmit_due(&self) -> Option<Instant> {
        self.window
            .oldest_sent_at()
            .map(|sent_at| self.policy.deadline(sent_at))
    }

    /// Retry counter of the segment starting at `offset`.
    pub fn retries_of(&self, offset: u32) -> Option<u32> {
        self.window.get(offset).map(|s| s.retries)
    }
}

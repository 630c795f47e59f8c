//! Fixed-capacity ring of in-flight segments.
//!
//! [`SendWindow`] stores one [`Slot`] per segment that has been sent but not
//! yet cumulatively acknowledged.  Slots are addressed by the byte offset of
//! their segment:
//!
//! ```text
//!  index = ((seq_num - origin) / max_payload) mod capacity
//! ```
//!
//! `origin` is the first data offset of the stream.  Every segment except the
//! last one carries exactly `max_payload` bytes, so consecutive segments land
//! in consecutive slots and a slot keeps its index while `window_base` moves
//! past its neighbours.  A slot is free again once the cumulative ACK has
//! moved past the end of its segment.

use tokio::time::Instant;

use crate::packet::Segment;

/// One in-flight segment and its retransmission bookkeeping.
#[derive(Debug, Clone)]
pub struct Slot {
    /// The segment exactly as first sent; retransmissions reuse it unchanged.
    pub segment: Segment,
    /// Payload length in bytes.
    pub len: u32,
    /// Time of the most recent (re)transmission.
    pub sent_at: Instant,
    /// Retransmissions so far (0 after the first send).
    pub retries: u32,
    /// Set once a cumulative ACK covers the whole segment.
    pub acked: bool,
}

impl Slot {
    /// First byte offset of the segment.
    pub fn seq(&self) -> u32 {
        self.segment.header.seq_num
    }

    /// First byte offset after the segment.
    pub fn end(&self) -> u32 {
        self.seq() + self.len
    }
}

/// Ring buffer of [`Slot`]s with a fixed number of entries.
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<Option<Slot>>,
    origin: u32,
    max_payload: u32,
}

impl SendWindow {
    /// Create an empty window for a stream whose first data byte is `origin`.
    pub fn new(origin: u32, capacity: usize, max_payload: usize) -> Self {
        assert!(capacity >= 1, "send window needs at least one slot");
        assert!(max_payload >= 1, "segments must carry at least one byte");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            origin,
            max_payload: max_payload as u32,
        }
    }

    fn index_of(&self, offset: u32) -> usize {
        ((offset - self.origin) / self.max_payload) as usize % self.slots.len()
    }

    /// Store a freshly sent segment in the slot its offset maps to.
    pub fn insert(&mut self, segment: Segment, now: Instant) {
        let idx = self.index_of(segment.header.seq_num);
        debug_assert!(
            self.slots[idx].as_ref().map_or(true, |s| s.acked),
            "slot {idx} still holds unacknowledged seq={}",
            self.slots[idx].as_ref().map_or(0, Slot::seq)
        );
        let len = segment.payload.len() as u32;
        self.slots[idx] = Some(Slot {
            segment,
            len,
            sent_at: now,
            retries: 0,
            acked: false,
        });
    }

    /// The slot holding the segment that starts at `offset`, if any.
    pub fn get(&self, offset: u32) -> Option<&Slot> {
        if offset < self.origin {
            return None;
        }
        self.slots[self.index_of(offset)]
            .as_ref()
            .filter(|s| s.seq() == offset)
    }

    pub fn get_mut(&mut self, offset: u32) -> Option<&mut Slot> {
        if offset < self.origin {
            return None;
        }
        let idx = self.index_of(offset);
        self.slots[idx].as_mut().filter(|s| s.seq() == offset)
    }

    /// Mark every segment that ends at or before `ack_num` as acknowledged.
    ///
    /// Returns how many slots were newly released.
    pub fn release_through(&mut self, ack_num: u32) -> usize {
        let mut released = 0;
        for slot in self.slots.iter_mut().flatten() {
            if !slot.acked && slot.end() <= ack_num {
                slot.acked = true;
                released += 1;
            }
        }
        released
    }

    /// Offsets of all unacknowledged segments, oldest first.
    pub fn pending_offsets(&self) -> Vec<u32> {
        let mut offsets: Vec<u32> = self
            .slots
            .iter()
            .flatten()
            .filter(|s| !s.acked)
            .map(Slot::seq)
            .collect();
        offsets.sort_unstable();
        offsets
    }

    /// Number of unacknowledged segments.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().flatten().filter(|s| !s.acked).count()
    }

    /// Earliest send time among unacknowledged segments.
    pub fn oldest_sent_at(&self) -> Option<Instant> {
        self.slots
            .iter()
            .flatten()
            .filter(|s| !s.acked)
            .map(|s| s.sent_at)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq: u32, len: usize) -> Segment {
        Segment::data(seq, 65535, vec![0xab; len])
    }

    #[test]
    fn consecutive_segments_use_consecutive_slots() {
        let mut w = SendWindow::new(101, 4, 10);
        let now = Instant::now();
        for i in 0..4 {
            w.insert(seg(101 + i * 10, 10), now);
        }
        assert_eq!(w.in_flight(), 4);
        assert_eq!(w.pending_offsets(), vec![101, 111, 121, 131]);
        assert_eq!(w.get(121).unwrap().len, 10);
        assert!(w.get(125).is_none());
    }

    #[test]
    fn release_through_frees_covered_slots_only() {
        let mut w = SendWindow::new(0, 4, 10);
        let now = Instant::now();
        w.insert(seg(0, 10), now);
        w.insert(seg(10, 10), now);
        w.insert(seg(20, 5), now);

        assert_eq!(w.release_through(20), 2);
        assert_eq!(w.pending_offsets(), vec![20]);
        // Already-acked slots are not counted twice.
        assert_eq!(w.release_through(20), 0);
        assert_eq!(w.release_through(25), 1);
        assert_eq!(w.in_flight(), 0);
    }

    #[test]
    fn slot_keeps_identity_as_base_advances() {
        let mut w = SendWindow::new(0, 3, 10);
        let now = Instant::now();
        w.insert(seg(0, 10), now);
        w.insert(seg(10, 10), now);
        w.insert(seg(20, 10), now);
        w.release_through(10);

        // Offset 30 wraps onto the slot just released by offset 0.
        w.insert(seg(30, 10), now);
        assert_eq!(w.get(10).unwrap().seq(), 10);
        assert_eq!(w.get(20).unwrap().seq(), 20);
        assert_eq!(w.get(30).unwrap().seq(), 30);
        assert!(w.get(0).is_none());
        assert_eq!(w.pending_offsets(), vec![10, 20, 30]);
    }

    #[test]
    fn offsets_before_origin_are_absent() {
        let w = SendWindow::new(100, 2, 10);
        assert!(w.get(50).is_none());
    }

    #[test]
    fn oldest_sent_at_tracks_unacked_only() {
        let mut w = SendWindow::new(0, 2, 10);
        let t0 = Instant::now();
        let t1 = t0 + std::time::Duration::from_millis(50);
        w.insert(seg(0, 10), t0);
        w.insert(seg(10, 10), t1);
        assert_eq!(w.oldest_sent_at(), Some(t0));
        w.release_through(10);
        assert_eq!(w.oldest_sent_at(), Some(t1));
        w.release_through(20);
        assert_eq!(w.oldest_sent_at(), None);
    }
}

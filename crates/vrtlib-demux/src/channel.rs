//! Per-channel double-buffer bookkeeping.
//!
//! Only counts and cursors live here; the sample storage itself is held by
//! the manager. Writers append to the active buffer, readers drain the
//! inactive one, and a flip swaps the two.

use vrtlib_codec::PACKET_COUNT_MODULUS;

use crate::sequence::{Continuity, CounterTracker};

#[derive(Debug, Clone)]
pub(crate) struct ChannelState {
    /// Selected for capture.
    pub valid: bool,
    /// Selection to adopt at the next reconfiguration.
    pub pending_valid: bool,
    active: usize,
    counts: [usize; 2],
    read_cursor: [usize; 2],
    flip_requested: bool,
    capacity: usize,
    packet_counter: CounterTracker,
}

impl ChannelState {
    pub fn new(capacity: usize) -> Self {
        ChannelState {
            valid: false,
            pending_valid: false,
            active: 0,
            counts: [0; 2],
            read_cursor: [0; 2],
            flip_requested: false,
            capacity,
            packet_counter: CounterTracker::new(PACKET_COUNT_MODULUS),
        }
    }

    /// Index of the buffer being written.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Index of the buffer being read.
    pub fn inactive(&self) -> usize {
        1 - self.active
    }

    /// Whether `samples` more fit in the active buffer right now.
    ///
    /// The buffer is never filled to the last slot.
    pub fn can_admit(&self, samples: usize) -> bool {
        self.counts[self.active] + samples < self.capacity
    }

    /// Whether `samples` would fit even in an empty buffer.
    pub fn could_ever_admit(&self, samples: usize) -> bool {
        samples < self.capacity
    }

    /// Reserve `samples` slots in the active buffer and return the offset of
    /// the first one.
    pub fn admit(&mut self, samples: usize) -> usize {
        let offset = self.counts[self.active];
        self.counts[self.active] += samples;
        offset
    }

    /// Samples written to the active buffer since the last flip.
    pub fn written(&self) -> usize {
        self.counts[self.active]
    }

    /// Unread samples in the inactive buffer.
    pub fn unread(&self) -> usize {
        self.counts[self.inactive()]
    }

    /// Read position in the inactive buffer.
    pub fn read_cursor(&self) -> usize {
        self.read_cursor[self.inactive()]
    }

    /// Mark `samples` of the inactive buffer as read.
    pub fn consume(&mut self, samples: usize) {
        let idx = self.inactive();
        let samples = samples.min(self.counts[idx]);
        self.read_cursor[idx] += samples;
        self.counts[idx] -= samples;
    }

    pub fn request_flip(&mut self) {
        self.flip_requested = true;
    }

    pub fn flip_requested(&self) -> bool {
        self.flip_requested
    }

    /// Swap buffers. The newly active buffer starts empty.
    pub fn flip(&mut self) {
        self.active = self.inactive();
        self.counts[self.active] = 0;
        self.read_cursor = [0; 2];
        self.flip_requested = false;
    }

    /// Adopt the pending selection and return to a clean slate.
    pub fn reset(&mut self) {
        self.valid = self.pending_valid;
        self.active = 0;
        self.counts = [0; 2];
        self.read_cursor = [0; 2];
        self.flip_requested = false;
        self.packet_counter.reset();
    }

    pub fn observe_packet_count(&mut self, count: u8) -> Continuity {
        self.packet_counter.observe(count as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_respects_strict_capacity() {
        let mut ch = ChannelState::new(8);
        assert!(ch.can_admit(7));
        assert!(!ch.can_admit(8));
        assert_eq!(ch.admit(4), 0);
        assert_eq!(ch.admit(3), 4);
        assert_eq!(ch.written(), 7);
        assert!(!ch.can_admit(1));
        assert!(ch.could_ever_admit(7));
        assert!(!ch.could_ever_admit(8));
    }

    #[test]
    fn flip_exposes_written_samples() {
        let mut ch = ChannelState::new(16);
        ch.admit(5);
        assert_eq!(ch.unread(), 0);
        ch.request_flip();
        ch.flip();
        assert!(!ch.flip_requested());
        assert_eq!(ch.inactive(), 0);
        assert_eq!(ch.unread(), 5);
        assert_eq!(ch.written(), 0);
    }

    #[test]
    fn consume_advances_cursor() {
        let mut ch = ChannelState::new(16);
        ch.admit(6);
        ch.flip();
        ch.consume(4);
        assert_eq!(ch.read_cursor(), 4);
        assert_eq!(ch.unread(), 2);
        ch.consume(10);
        assert_eq!(ch.unread(), 0);
        assert_eq!(ch.read_cursor(), 6);
    }

    #[test]
    fn flip_clears_new_active_and_cursors() {
        let mut ch = ChannelState::new(16);
        ch.admit(3);
        ch.flip();
        ch.admit(2);
        ch.consume(1);
        ch.flip();
        // Buffer 0 had 2 unread left over; it is now the write target.
        assert_eq!(ch.active(), 0);
        assert_eq!(ch.written(), 0);
        assert_eq!(ch.unread(), 2);
        assert_eq!(ch.read_cursor(), 0);
    }

    #[test]
    fn reset_adopts_pending_and_discards() {
        let mut ch = ChannelState::new(16);
        ch.pending_valid = true;
        ch.admit(3);
        ch.flip();
        ch.observe_packet_count(4);
        ch.reset();
        assert!(ch.valid);
        assert_eq!(ch.unread(), 0);
        assert_eq!(ch.written(), 0);
        assert_eq!(ch.observe_packet_count(9), Continuity::First);
    }
}

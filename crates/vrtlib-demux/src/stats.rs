//! Demultiplexer counters.
//!
//! The demux thread bumps these with relaxed atomics as it goes. Readers
//! take a [`StatsSnapshot`], which is a plain copy and may be slightly torn
//! across fields.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the demultiplexer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// VRL frames decoded.
    pub frames_parsed: u64,
    /// Frame counter discontinuities.
    pub frame_loss_events: u64,
    /// VRT data packets admitted to a channel buffer.
    pub packets_parsed: u64,
    /// Packet counter discontinuities.
    pub packet_loss_events: u64,
    /// Packets missing according to the packet counters.
    pub packets_lost: u64,
    /// Packets whose stream id maps outside the configured channels.
    pub dropped_bad_channel: u64,
    /// Packets for channels not currently selected.
    pub dropped_inactive_channel: u64,
    /// Packets too large to ever fit a channel buffer.
    pub dropped_oversized: u64,
    /// Windows abandoned because of a hard parse error.
    pub parse_errors: u64,
    /// Bytes carried over to the next window to stitch a split frame.
    pub bytes_staged: u64,
    /// Samples written into channel buffers.
    pub samples_admitted: u64,
    /// Buffer flips performed.
    pub flips: u64,
    /// Channel set changes applied.
    pub reconfigurations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StreamStats {
    pub frames_parsed: AtomicU64,
    pub frame_loss_events: AtomicU64,
    pub packets_parsed: AtomicU64,
    pub packet_loss_events: AtomicU64,
    pub packets_lost: AtomicU64,
    pub dropped_bad_channel: AtomicU64,
    pub dropped_inactive_channel: AtomicU64,
    pub dropped_oversized: AtomicU64,
    pub parse_errors: AtomicU64,
    pub bytes_staged: AtomicU64,
    pub samples_admitted: AtomicU64,
    pub flips: AtomicU64,
    pub reconfigurations: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl StreamStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_parsed: get(&self.frames_parsed),
            frame_loss_events: get(&self.frame_loss_events),
            packets_parsed: get(&self.packets_parsed),
            packet_loss_events: get(&self.packet_loss_events),
            packets_lost: get(&self.packets_lost),
            dropped_bad_channel: get(&self.dropped_bad_channel),
            dropped_inactive_channel: get(&self.dropped_inactive_channel),
            dropped_oversized: get(&self.dropped_oversized),
            parse_errors: get(&self.parse_errors),
            bytes_staged: get(&self.bytes_staged),
            samples_admitted: get(&self.samples_admitted),
            flips: get(&self.flips),
            reconfigurations: get(&self.reconfigurations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_bumps() {
        let stats = StreamStats::default();
        bump(&stats.frames_parsed, 2);
        bump(&stats.packets_lost, 5);
        bump(&stats.packets_lost, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.frames_parsed, 2);
        assert_eq!(snap.packets_lost, 6);
        assert_eq!(snap.flips, 0);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let stats = StreamStats::default();
        let before = stats.snapshot();
        bump(&stats.flips, 1);
        assert_eq!(before, StatsSnapshot::default());
        assert_eq!(stats.snapshot().flips, 1);
    }
}

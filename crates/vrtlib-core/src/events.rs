//! Stream event types.
//!
//! Events are emitted by the demultiplexer through a `tokio::sync::broadcast`
//! channel whenever it detects loss or changes channel state. Monitoring
//! tools subscribe to these instead of scraping log output. Delivery is
//! best-effort: a slow subscriber lags and misses events, it never stalls
//! the demux thread.

use crate::types::ChannelId;

/// An event emitted by the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The VRL frame counter skipped one or more values.
    FrameLoss {
        /// Counter value that was expected next.
        expected: u16,
        /// Counter value actually received.
        observed: u16,
    },

    /// The VRT packet counter of a channel skipped one or more values.
    PacketLoss {
        /// Channel the gap was seen on.
        channel: ChannelId,
        /// Counter value that was expected next.
        expected: u8,
        /// Counter value actually received.
        observed: u8,
        /// Number of packets missing between the two (modulo 16).
        lost: u8,
    },

    /// A consumer-requested buffer flip completed.
    Flipped {
        /// Channels whose buffers were swapped.
        channels: Vec<ChannelId>,
    },

    /// The active channel set changed and all buffers were reset.
    Reconfigured {
        /// Channels now selected for capture.
        active: Vec<ChannelId>,
    },

    /// The demux thread has drained its workers and exited.
    Stopped,
}

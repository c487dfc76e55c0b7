//! ComplexManagerBuilder -- fluent builder for [`ComplexManager`] instances.
//!
//! Every setting has a default sized for a single-tuner receiver, so the
//! simplest usage is:
//!
//! ```no_run
//! use vrtlib_core::ChannelId;
//! use vrtlib_demux::ComplexManagerBuilder;
//! # fn example(ingest: impl vrtlib_core::IngestSource + 'static) -> vrtlib_core::Result<()> {
//! let manager = ComplexManagerBuilder::new()
//!     .channel_count(4)
//!     .worker_count(2)
//!     .active_channels(&[ChannelId::FIRST])
//!     .build(ingest)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use vrtlib_codec::{MIN_SCAN_WORDS, WORD_SIZE};
use vrtlib_core::{ByteOrder, ChannelId, ComplexSample, Error, IngestSource, Result};

use crate::manager::ComplexManager;

/// Default number of channels.
const DEFAULT_CHANNEL_COUNT: usize = 1;

/// Default samples per channel buffer.
const DEFAULT_CHANNEL_CAPACITY: usize = 2_097_152;

/// Default conversion worker count.
const DEFAULT_WORKER_COUNT: usize = 1;

/// Default flip-and-retry attempts per `fill_buffers` call.
const DEFAULT_MAX_FILL_RETRIES: usize = 10;

/// Default overflow staging size in bytes.
const DEFAULT_STAGING_CAPACITY: usize = 65_536;

/// Default ingest read size in bytes.
const DEFAULT_INGEST_BUFFER_SIZE: usize = 1 << 20;

/// Default sample buffer alignment in bytes.
const DEFAULT_ALIGNMENT: usize = vrtlib_core::DEFAULT_ALIGNMENT;

/// Default backoff while work is imminent.
const DEFAULT_SHORT_BACKOFF: Duration = Duration::from_micros(20);

/// Default backoff while idle.
const DEFAULT_LONG_BACKOFF: Duration = Duration::from_micros(500);

/// Default event channel depth.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Most channels a stream id can address (its low byte).
pub const MAX_CHANNELS: usize = 256;

/// Validated demultiplexer settings.
///
/// Produced by [`ComplexManagerBuilder`]; a running manager exposes its copy
/// through [`ComplexManager::config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Number of channels (stream ids `0..channel_count`).
    pub channel_count: usize,
    /// Samples held by each of a channel's two buffers.
    pub channel_capacity: usize,
    /// Conversion workers.
    pub worker_count: usize,
    /// Flip-and-retry attempts before `fill_buffers` gives up with 0.
    pub max_fill_retries: usize,
    /// Bytes of look-back kept to stitch split frames.
    pub staging_capacity: usize,
    /// Bytes requested from the ingest source per read.
    pub ingest_buffer_size: usize,
    /// Alignment of the sample buffers in bytes.
    pub alignment: usize,
    /// Word order on the wire.
    pub byte_order: ByteOrder,
    /// Poll interval while work is expected shortly.
    pub short_backoff: Duration,
    /// Poll interval while idle.
    pub long_backoff: Duration,
    /// Depth of the event broadcast channel.
    pub event_capacity: usize,
    /// Channels selected for capture at start.
    pub active_channels: Vec<ChannelId>,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            channel_count: DEFAULT_CHANNEL_COUNT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            max_fill_retries: DEFAULT_MAX_FILL_RETRIES,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            ingest_buffer_size: DEFAULT_INGEST_BUFFER_SIZE,
            alignment: DEFAULT_ALIGNMENT,
            byte_order: ByteOrder::Big,
            short_backoff: DEFAULT_SHORT_BACKOFF,
            long_backoff: DEFAULT_LONG_BACKOFF,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            active_channels: Vec::new(),
        }
    }
}

impl DemuxConfig {
    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(Error::InvalidParameter(msg))
        }

        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return invalid(format!(
                "channel_count must be 1..={MAX_CHANNELS}, got {}",
                self.channel_count
            ));
        }
        if self.channel_capacity < 2 {
            return invalid(format!(
                "channel_capacity must be at least 2 samples, got {}",
                self.channel_capacity
            ));
        }
        if self.worker_count == 0 {
            return invalid("worker_count must be non-zero".into());
        }
        if self.max_fill_retries == 0 {
            return invalid("max_fill_retries must be non-zero".into());
        }
        let min_staging = MIN_SCAN_WORDS * WORD_SIZE;
        if self.staging_capacity < min_staging {
            return invalid(format!(
                "staging_capacity must be at least {min_staging} bytes, got {}",
                self.staging_capacity
            ));
        }
        if self.ingest_buffer_size == 0 {
            return invalid("ingest_buffer_size must be non-zero".into());
        }
        if !self.alignment.is_power_of_two()
            || self.alignment < std::mem::align_of::<ComplexSample>()
        {
            return invalid(format!(
                "alignment must be a power of two of at least {}, got {}",
                std::mem::align_of::<ComplexSample>(),
                self.alignment
            ));
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be non-zero".into());
        }
        if let Some(ch) = self
            .active_channels
            .iter()
            .find(|ch| ch.index() >= self.channel_count)
        {
            return invalid(format!(
                "active channel {ch} is outside the {} configured channels",
                self.channel_count
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`ComplexManager`].
#[derive(Debug, Clone, Default)]
pub struct ComplexManagerBuilder {
    config: DemuxConfig,
}

impl ComplexManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of channels (default: 1).
    pub fn channel_count(mut self, count: usize) -> Self {
        self.config.channel_count = count;
        self
    }

    /// Set the per-buffer sample capacity (default: 2,097,152).
    pub fn channel_capacity(mut self, samples: usize) -> Self {
        self.config.channel_capacity = samples;
        self
    }

    /// Set the number of conversion workers (default: 1).
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set the flip-and-retry budget of `fill_buffers` (default: 10).
    pub fn max_fill_retries(mut self, retries: usize) -> Self {
        self.config.max_fill_retries = retries;
        self
    }

    /// Set the overflow staging size in bytes (default: 64 KiB).
    ///
    /// Must hold the largest fragment of a frame that can be left at the end
    /// of one ingest read.
    pub fn staging_capacity(mut self, bytes: usize) -> Self {
        self.config.staging_capacity = bytes;
        self
    }

    /// Set the ingest read size in bytes (default: 1 MiB).
    pub fn ingest_buffer_size(mut self, bytes: usize) -> Self {
        self.config.ingest_buffer_size = bytes;
        self
    }

    /// Set the sample buffer alignment in bytes (default: 64).
    pub fn alignment(mut self, bytes: usize) -> Self {
        self.config.alignment = bytes;
        self
    }

    /// Set the wire word order (default: big-endian).
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.byte_order = order;
        self
    }

    /// Set the poll interval used while work is imminent (default: 20us).
    pub fn short_backoff(mut self, interval: Duration) -> Self {
        self.config.short_backoff = interval;
        self
    }

    /// Set the poll interval used while idle (default: 500us).
    pub fn long_backoff(mut self, interval: Duration) -> Self {
        self.config.long_backoff = interval;
        self
    }

    /// Set the event broadcast depth (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Select channels for capture from the start (default: none).
    pub fn active_channels(mut self, channels: &[ChannelId]) -> Self {
        self.config.active_channels = channels.to_vec();
        self
    }

    /// Validate and return the configuration without starting anything.
    pub fn config(self) -> Result<DemuxConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration, allocate buffers and start the demux
    /// thread reading from `ingest`.
    pub fn build<I>(self, ingest: I) -> Result<ComplexManager>
    where
        I: IngestSource + 'static,
    {
        ComplexManager::start(self.config()?, ingest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ComplexManagerBuilder::new().config().unwrap();
        assert_eq!(cfg.channel_count, 1);
        assert_eq!(cfg.channel_capacity, 2_097_152);
        assert_eq!(cfg.worker_count, 1);
        assert_eq!(cfg.max_fill_retries, 10);
        assert_eq!(cfg.staging_capacity, 65_536);
        assert_eq!(cfg.ingest_buffer_size, 1 << 20);
        assert_eq!(cfg.alignment, 64);
        assert_eq!(cfg.byte_order, ByteOrder::Big);
        assert_eq!(cfg.short_backoff, Duration::from_micros(20));
        assert_eq!(cfg.long_backoff, Duration::from_micros(500));
        assert_eq!(cfg.event_capacity, 256);
        assert!(cfg.active_channels.is_empty());
    }

    #[test]
    fn setters_apply() {
        let cfg = ComplexManagerBuilder::new()
            .channel_count(8)
            .channel_capacity(1024)
            .worker_count(3)
            .max_fill_retries(2)
            .staging_capacity(4096)
            .ingest_buffer_size(9000)
            .alignment(128)
            .byte_order(ByteOrder::Little)
            .short_backoff(Duration::from_micros(1))
            .long_backoff(Duration::from_millis(1))
            .event_capacity(4)
            .active_channels(&[ChannelId::FIRST])
            .config()
            .unwrap();
        assert_eq!(cfg.channel_count, 8);
        assert_eq!(cfg.channel_capacity, 1024);
        assert_eq!(cfg.worker_count, 3);
        assert_eq!(cfg.alignment, 128);
        assert_eq!(cfg.byte_order, ByteOrder::Little);
        assert_eq!(cfg.active_channels, vec![ChannelId::FIRST]);
    }

    fn rejected(builder: ComplexManagerBuilder) -> bool {
        matches!(builder.config(), Err(Error::InvalidParameter(_)))
    }

    #[test]
    fn invalid_settings_rejected() {
        let b = ComplexManagerBuilder::new;
        assert!(rejected(b().channel_count(0)));
        assert!(rejected(b().channel_count(257)));
        assert!(rejected(b().channel_capacity(1)));
        assert!(rejected(b().worker_count(0)));
        assert!(rejected(b().max_fill_retries(0)));
        assert!(rejected(b().staging_capacity(16)));
        assert!(rejected(b().ingest_buffer_size(0)));
        assert!(rejected(b().alignment(48)));
        assert!(rejected(b().alignment(2)));
        assert!(rejected(b().event_capacity(0)));
        assert!(rejected(b().active_channels(&[ChannelId::new(2).unwrap()])));
    }

    #[test]
    fn boundary_settings_accepted() {
        assert!(ComplexManagerBuilder::new()
            .channel_count(256)
            .staging_capacity(20)
            .alignment(8)
            .config()
            .is_ok());
    }
}

//! vrtlib-demux: the complex manager.
//!
//! Turns a raw VRL byte stream into per-channel buffers of normalized
//! complex samples. A background thread decodes frames with
//! [`vrtlib_codec`], stitches frames split across ingest reads, tracks frame
//! and packet counters for loss, and hands payload conversion to a small
//! [`WorkerPool`]. Consumers pull samples with
//! [`ComplexManager::fill_buffers`] and change the captured channel set
//! with [`ComplexManager::update_tuners`].
//!
//! # Key types
//!
//! - [`ComplexManager`] -- the running demultiplexer
//! - [`ComplexManagerBuilder`] / [`DemuxConfig`] -- configuration
//! - [`StatsSnapshot`] -- loss and drop counters
//! - [`WorkerPool`] -- conversion workers
//!
//! # Example
//!
//! ```no_run
//! use vrtlib_core::{ChannelId, ComplexSample};
//! use vrtlib_demux::ComplexManager;
//!
//! # fn example(ingest: impl vrtlib_core::IngestSource + 'static) -> vrtlib_core::Result<()> {
//! let manager = ComplexManager::builder()
//!     .active_channels(&[ChannelId::FIRST])
//!     .build(ingest)?;
//!
//! let mut samples = vec![ComplexSample::default(); 4096];
//! let n = manager.fill_buffers(&mut [&mut samples[..]], &[ChannelId::FIRST], 4096)?;
//! println!("got {n} samples");
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod channel;
pub mod convert;
pub mod manager;
pub mod sequence;
pub mod staging;
pub mod stats;
pub mod worker;

pub use builder::{ComplexManagerBuilder, DemuxConfig, MAX_CHANNELS};
pub use convert::{convert_samples, convert_word, SAMPLE_SCALE};
pub use manager::ComplexManager;
pub use sequence::{Continuity, CounterTracker};
pub use staging::OverflowStaging;
pub use stats::StatsSnapshot;
pub use worker::WorkerPool;

//! # vrtlib -- VITA-49 I/Q Streams for Software Defined Radio
//!
//! `vrtlib` decodes VITA-49 radio transport (VRT) packets carried in VRL
//! frames and demultiplexes the I/Q payloads of a multi-tuner receiver into
//! per-channel buffers of normalized complex samples. It is designed for
//! receivers that push tens of megasamples per second over UDP, where
//! decoding must keep up with the wire and consumers pull at their own pace.
//!
//! ## Quick Start
//!
//! Add `vrtlib` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! vrtlib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Capture tuner 1 from a radio streaming to UDP port 4991:
//!
//! ```no_run
//! use vrtlib::demux::ComplexManagerBuilder;
//! use vrtlib::transport::UdpIngest;
//! use vrtlib::{ChannelId, ComplexSample};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ingest = UdpIngest::bind("0.0.0.0:4991").await?;
//!     let manager = ComplexManagerBuilder::new()
//!         .channel_count(4)
//!         .active_channels(&[ChannelId::FIRST])
//!         .build(ingest)?;
//!
//!     let mut samples = vec![ComplexSample::default(); 65_536];
//!     let n = manager.fill_buffers(&mut [&mut samples[..]], &[ChannelId::FIRST], 65_536)?;
//!     println!("read {n} samples");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! - `vrtlib-core` -- errors, channel and sample types, events, the
//!   [`IngestSource`] trait and the aligned buffer pool
//! - `vrtlib-codec` -- stateless VRL frame and VRT packet decoding
//!   (re-exported as [`codec`])
//! - `vrtlib-demux` -- the complex manager: worker pool, double-buffered
//!   channels, loss tracking and the consumer pull API (feature `demux`)
//! - `vrtlib-transport` -- the UDP ingest source (feature `transport`)
//!
//! ## Loss Reporting
//!
//! Frame and packet counter gaps are published as [`StreamEvent`]s. Subscribe
//! to them without polling:
//!
//! ```no_run
//! # #[cfg(feature = "demux")]
//! # async fn example(manager: &vrtlib::demux::ComplexManager) {
//! use vrtlib::StreamEvent;
//!
//! let mut events = manager.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let StreamEvent::PacketLoss { channel, lost, .. } = event {
//!         println!("{channel}: {lost} packets lost");
//!     }
//! }
//! # }
//! ```

pub use vrtlib_core::*;

/// VRL frame and VRT packet decoding.
///
/// Provides [`parse_frame`](codec::parse_frame) and
/// [`parse_packet`](codec::parse_packet) plus the zero-copy views they
/// return. Always available.
pub mod codec {
    pub use vrtlib_codec::*;
}

/// Stream demultiplexer.
///
/// Provides [`ComplexManager`](demux::ComplexManager) and
/// [`ComplexManagerBuilder`](demux::ComplexManagerBuilder), which turn a raw
/// VRL byte stream into per-channel complex sample buffers.
#[cfg(feature = "demux")]
pub mod demux {
    pub use vrtlib_demux::*;
}

/// Ingest sources.
///
/// Provides [`UdpIngest`](transport::UdpIngest), which queues datagrams from
/// a tokio UDP socket for the demultiplexer.
#[cfg(feature = "transport")]
pub mod transport {
    pub use vrtlib_transport::*;
}

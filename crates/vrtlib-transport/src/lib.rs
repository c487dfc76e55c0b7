//! Transport implementations for vrtlib.
//!
//! This crate provides concrete [`IngestSource`](vrtlib_core::IngestSource)
//! implementations that feed raw VRL bytes to the demultiplexer:
//!
//! - [`UdpIngest`]: datagrams from a radio's VITA-49 output port, queued by
//!   a tokio receive task
//!
//! # Example
//!
//! ```no_run
//! use vrtlib_core::IngestSource;
//! use vrtlib_transport::UdpIngest;
//!
//! # async fn example() -> vrtlib_core::Result<()> {
//! let mut ingest = UdpIngest::bind("0.0.0.0:4991").await?;
//!
//! let mut buf = vec![0u8; 1 << 16];
//! let n = ingest.next_buffer(&mut buf)?;
//! println!("{n} bytes queued");
//! # Ok(())
//! # }
//! ```

pub mod udp;

pub use udp::{UdpIngest, UdpIngestBuilder, UdpIngestStats};

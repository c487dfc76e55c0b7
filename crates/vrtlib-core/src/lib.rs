//! vrtlib-core: Core types, traits, and error definitions for vrtlib.
//!
//! This crate defines the pieces every other vrtlib crate shares: the error
//! taxonomy used to tell "wait for more bytes" apart from "skip this window",
//! channel and sample types, stream events, the [`IngestSource`] trait that
//! feeds raw datagrams in, and the aligned buffer pool that backs the
//! per-channel sample buffers.
//!
//! # Key types
//!
//! - [`IngestSource`] -- non-blocking supplier of raw VRL bytes
//! - [`AlignedBufferPool`] -- cache-aligned sample storage
//! - [`StreamEvent`] -- loss and reconfiguration notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod ingest;
pub mod pool;
pub mod types;

// Re-export key types at crate root for ergonomic `use vrtlib_core::*`.
pub use error::{Error, Result};
pub use events::StreamEvent;
pub use ingest::IngestSource;
pub use pool::{AlignedBuffer, AlignedBufferPool, DEFAULT_ALIGNMENT};
pub use types::*;

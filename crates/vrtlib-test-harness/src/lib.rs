//! vrtlib-test-harness: Test utilities for vrtlib.
//!
//! This crate provides [`VrtPacketBuilder`] and [`VrlFrameBuilder`] for
//! hand-encoding wire data, and [`MockIngest`] for feeding a demultiplexer
//! scripted byte chunks without a network.

pub mod builders;
pub mod mock_ingest;

pub use builders::{iq_word, VrlFrameBuilder, VrtPacketBuilder};
pub use mock_ingest::{MockIngest, MockIngestHandle};

//! vrtlib-codec: VITA-49 VRT packet and VRL frame decoder.
//!
//! A pure parser with no I/O dependencies. All functions operate on byte
//! slices and return borrowed views ([`VrlFrame`], [`VrtPacket`]) or an
//! [`Error`](vrtlib_core::Error).
//!
//! The error kind tells the caller what to do next:
//!
//! - `InsufficientData` with `needed > available` -- keep the bytes and try
//!   again once more have arrived (a frame was split across two reads).
//! - anything else -- the window cannot be decoded; skip it.
//!
//! # Example
//!
//! ```
//! use vrtlib_codec::parse_frame;
//!
//! # fn example(window: &[u8]) -> vrtlib_core::Result<()> {
//! let (frame, skipped_words) = parse_frame(window)?;
//! for packet in frame.packets() {
//!     if packet.packet_type().is_data() {
//!         println!("{packet} after skipping {skipped_words} words");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod frame;
pub mod header;
pub mod packet;

pub use frame::{
    is_alignment_word, parse_frame, parse_frame_with, FrameTrailer, VrlFrame, VrlFrameInfo,
    ALIGNMENT_VRLP, ALIGNMENT_VS49, FRAME_COUNT_MODULUS, FRAME_OVERHEAD_WORDS, MIN_SCAN_WORDS,
    TRAILER_VEND,
};
pub use header::{
    FractionalTimestampType, IntegerTimestampType, PacketType, TimestampMode, VrtHeader,
    PACKET_COUNT_MODULUS,
};
pub use packet::{parse_packet, parse_packet_with, ClassId, VrtPacket, WORD_SIZE};

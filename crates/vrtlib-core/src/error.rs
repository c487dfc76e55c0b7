//! Error types for vrtlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Wire decode errors, demultiplexer
//! configuration errors, and ingest failures are all captured here.
//!
//! The distinction that matters most is between [`Error::InsufficientData`]
//! and everything else. Running out of bytes in the middle of a frame is not
//! a fault: the caller keeps the unparsed tail and retries once the next
//! datagram arrives. [`Error::is_recoverable`] is the only place that makes
//! that call.

use crate::types::PacketField;

/// The error type for all vrtlib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer ends before the frame or packet it describes.
    ///
    /// Both values are byte counts relative to the slice handed to the
    /// decoder. Retry with more bytes appended.
    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes that were available.
        available: usize,
    },

    /// The packet header carries a type code outside `0x0..=0x5`.
    #[error("unsupported VRT packet type 0x{0:X}")]
    UnsupportedPacketType(u8),

    /// No VRL frame alignment word was found in the scanned window.
    #[error("no VRL alignment word found in {scanned} bytes")]
    NoAlignmentWord {
        /// Number of bytes examined before the scan gave up. Bytes past
        /// this point were too few to hold a frame and were not examined.
        scanned: usize,
    },

    /// A structurally invalid frame or packet (e.g. a size field too
    /// small to hold the header's mandatory fields).
    #[error("malformed data: {0}")]
    Malformed(String),

    /// An optional packet field was requested but the header says it is
    /// absent.
    #[error("field not present: {0}")]
    FieldNotPresent(PacketField),

    /// An invalid parameter was passed to a configuration or API call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A decode resource (worker, buffer) could not be obtained.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The demultiplexer has been stopped.
    #[error("not running")]
    NotRunning,

    /// The ingest source closed and will not deliver more data.
    #[error("stream closed")]
    StreamClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means "come back with more bytes".
    ///
    /// True only for [`Error::InsufficientData`] where the required length
    /// genuinely exceeds what was supplied. A packet that overruns its own
    /// frame inside an otherwise complete buffer is reported as
    /// `InsufficientData` by the packet decoder but cannot be fixed by
    /// waiting, so it is not recoverable here.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InsufficientData { needed, available } if needed > available)
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_insufficient_data() {
        let e = Error::InsufficientData {
            needed: 40,
            available: 12,
        };
        assert_eq!(e.to_string(), "insufficient data: need 40 bytes, have 12");
    }

    #[test]
    fn error_display_unsupported_packet_type() {
        let e = Error::UnsupportedPacketType(0xA);
        assert_eq!(e.to_string(), "unsupported VRT packet type 0xA");
    }

    #[test]
    fn error_display_no_alignment_word() {
        let e = Error::NoAlignmentWord { scanned: 64 };
        assert_eq!(e.to_string(), "no VRL alignment word found in 64 bytes");
    }

    #[test]
    fn error_display_field_not_present() {
        let e = Error::FieldNotPresent(PacketField::Trailer);
        assert_eq!(e.to_string(), "field not present: trailer");
    }

    #[test]
    fn error_display_not_running() {
        assert_eq!(Error::NotRunning.to_string(), "not running");
    }

    #[test]
    fn insufficient_data_is_recoverable() {
        let e = Error::InsufficientData {
            needed: 100,
            available: 20,
        };
        assert!(e.is_recoverable());
    }

    #[test]
    fn satisfied_insufficient_data_is_not_recoverable() {
        let e = Error::InsufficientData {
            needed: 20,
            available: 100,
        };
        assert!(!e.is_recoverable());
    }

    #[test]
    fn hard_errors_are_not_recoverable() {
        assert!(!Error::UnsupportedPacketType(7).is_recoverable());
        assert!(!Error::NoAlignmentWord { scanned: 0 }.is_recoverable());
        assert!(!Error::Malformed("x".into()).is_recoverable());
        assert!(!Error::FieldNotPresent(PacketField::StreamId).is_recoverable());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}

//! Ingest source trait.
//!
//! The [`IngestSource`] trait abstracts over whatever delivers raw VRL bytes
//! to the demultiplexer: a UDP listener in production, a scripted mock in
//! tests. The demux thread polls it; implementations must not block for
//! long, because flips and reconfiguration are serviced on the same thread.

use crate::error::Result;

/// Non-blocking supplier of raw datagram bytes.
///
/// Each call copies the next available contiguous block of bytes into the
/// start of `dst` and returns how many bytes were written. Block boundaries
/// need not line up with frame boundaries: the demultiplexer stitches
/// frames that straddle two calls.
pub trait IngestSource: Send {
    /// Copy the next available bytes into `dst`.
    ///
    /// Returns `Ok(0)` when nothing is available right now. Returns
    /// [`Error::StreamClosed`](crate::Error::StreamClosed) when no more data
    /// will ever arrive; the demultiplexer then drains and stops. Other
    /// errors are logged and the call is retried after a backoff.
    fn next_buffer(&mut self, dst: &mut [u8]) -> Result<usize>;
}

impl<T: IngestSource + ?Sized> IngestSource for Box<T> {
    fn next_buffer(&mut self, dst: &mut [u8]) -> Result<usize> {
        (**self).next_buffer(dst)
    }
}

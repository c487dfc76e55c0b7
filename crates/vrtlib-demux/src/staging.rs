//! Overflow staging for frames split across ingest reads.
//!
//! When a window ends part way through a frame, the unparsed tail is kept
//! here. On the next read it is copied back in immediately before the new
//! bytes, so the codec sees one contiguous frame.

use vrtlib_core::{Error, Result};

/// Fixed-capacity holding area for the unparsed tail of a window.
#[derive(Debug)]
pub struct OverflowStaging {
    buf: Box<[u8]>,
    len: usize,
}

impl OverflowStaging {
    /// Create an empty staging area holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        OverflowStaging {
            buf: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Maximum number of bytes that can be staged.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes currently staged.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Replace the staged bytes with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if `bytes` exceeds the capacity.
    /// The staging area is left empty in that case.
    pub fn stash(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.buf.len() {
            self.len = 0;
            return Err(Error::ResourceExhausted(format!(
                "{} bytes exceed overflow staging capacity of {}",
                bytes.len(),
                self.buf.len()
            )));
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    /// Move the staged bytes into `window` so they end just before `start`.
    ///
    /// Returns the index where the staged bytes now begin, which is the new
    /// scan start. The staging area is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if there is not enough room in
    /// `window` before `start`.
    pub fn take_into(&mut self, window: &mut [u8], start: usize) -> Result<usize> {
        if self.len > start || start > window.len() {
            return Err(Error::InvalidParameter(format!(
                "cannot prepend {} staged bytes before offset {start} of a {}-byte window",
                self.len,
                window.len()
            )));
        }
        let begin = start - self.len;
        window[begin..start].copy_from_slice(&self.buf[..self.len]);
        self.len = 0;
        Ok(begin)
    }

    /// Discard anything staged.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stash_and_prepend() {
        let mut staging = OverflowStaging::new(8);
        staging.stash(&[1, 2, 3]).unwrap();
        assert_eq!(staging.len(), 3);

        let mut window = [0u8; 12];
        window[8..].copy_from_slice(&[4, 5, 6, 7]);
        let begin = staging.take_into(&mut window, 8).unwrap();
        assert_eq!(begin, 5);
        assert_eq!(&window[begin..], &[1, 2, 3, 4, 5, 6, 7]);
        assert!(staging.is_empty());
    }

    #[test]
    fn empty_take_is_a_no_op() {
        let mut staging = OverflowStaging::new(4);
        let mut window = [7u8; 6];
        assert_eq!(staging.take_into(&mut window, 4).unwrap(), 4);
        assert_eq!(window, [7; 6]);
    }

    #[test]
    fn stash_too_large() {
        let mut staging = OverflowStaging::new(4);
        staging.stash(&[1]).unwrap();
        let err = staging.stash(&[0; 5]).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
        assert!(staging.is_empty());
    }

    #[test]
    fn stash_replaces_previous() {
        let mut staging = OverflowStaging::new(4);
        staging.stash(&[1, 2, 3, 4]).unwrap();
        staging.stash(&[9]).unwrap();
        let mut window = [0u8; 4];
        assert_eq!(staging.take_into(&mut window, 4).unwrap(), 3);
        assert_eq!(window, [0, 0, 0, 9]);
    }

    #[test]
    fn take_without_room_fails() {
        let mut staging = OverflowStaging::new(8);
        staging.stash(&[1, 2, 3]).unwrap();
        let mut window = [0u8; 8];
        assert!(matches!(
            staging.take_into(&mut window, 2),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(staging.len(), 3);
    }
}

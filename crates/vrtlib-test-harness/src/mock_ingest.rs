//! Scripted ingest source for deterministic demultiplexer tests.
//!
//! [`MockIngest`] implements [`IngestSource`] over a queue of byte chunks.
//! Each chunk is delivered by one `next_buffer()` call (split further only
//! if the destination is smaller), which lets a test choose exactly where
//! frames break across reads. The queue is shared with a
//! [`MockIngestHandle`] so a test can keep feeding data after the source has
//! been moved into a running manager.
//!
//! # Example
//!
//! ```
//! use vrtlib_test_harness::MockIngest;
//!
//! let (ingest, handle) = MockIngest::new();
//! handle.push(&[0x56, 0x52, 0x4C, 0x50]);
//! handle.close();
//! // Hand `ingest` to ComplexManagerBuilder::build(...)
//! # drop(ingest);
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use vrtlib_core::{Error, IngestSource, Result};

#[derive(Debug, Default)]
struct Script {
    chunks: VecDeque<Vec<u8>>,
    /// Bytes of the front chunk already delivered.
    cursor: usize,
    /// Errors to return before the next chunk.
    failures: VecDeque<io::ErrorKind>,
    closed: bool,
    reads: usize,
    bytes_delivered: usize,
}

/// An [`IngestSource`] that replays scripted chunks.
///
/// Returns `Ok(0)` while the queue is empty, and
/// [`Error::StreamClosed`] once the queue is empty and
/// [`MockIngestHandle::close`] has been called.
#[derive(Debug)]
pub struct MockIngest {
    script: Arc<Mutex<Script>>,
}

/// Feeds a [`MockIngest`] from the test thread.
#[derive(Debug, Clone)]
pub struct MockIngestHandle {
    script: Arc<Mutex<Script>>,
}

impl MockIngest {
    /// Create an empty source and its feeding handle.
    pub fn new() -> (MockIngest, MockIngestHandle) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            MockIngest {
                script: Arc::clone(&script),
            },
            MockIngestHandle { script },
        )
    }

    /// Create a source pre-loaded with `chunks` that closes after them.
    pub fn from_chunks<I>(chunks: I) -> MockIngest
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let (ingest, handle) = Self::new();
        for chunk in chunks {
            handle.push(&chunk);
        }
        handle.close();
        ingest
    }
}

impl MockIngestHandle {
    /// Queue one chunk.
    pub fn push(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.script.lock().chunks.push_back(bytes.to_vec());
        }
    }

    /// Queue `bytes` as several chunks, cut at each offset in `splits`.
    ///
    /// Offsets are absolute, ascending, and clamped to `bytes.len()`.
    pub fn push_split(&self, bytes: &[u8], splits: &[usize]) {
        let mut start = 0;
        for &at in splits {
            let at = at.clamp(start, bytes.len());
            self.push(&bytes[start..at]);
            start = at;
        }
        self.push(&bytes[start..]);
    }

    /// Make the next read fail with an I/O error of `kind`.
    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.script.lock().failures.push_back(kind);
    }

    /// Report end of stream once the queue drains.
    pub fn close(&self) {
        self.script.lock().closed = true;
    }

    /// Chunks not yet fully delivered.
    pub fn pending(&self) -> usize {
        self.script.lock().chunks.len()
    }

    /// Whether every queued byte has been delivered.
    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    /// Number of `next_buffer` calls that delivered data.
    pub fn reads(&self) -> usize {
        self.script.lock().reads
    }

    /// Total bytes delivered.
    pub fn bytes_delivered(&self) -> usize {
        self.script.lock().bytes_delivered
    }
}

impl IngestSource for MockIngest {
    fn next_buffer(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut script = self.script.lock();

        if let Some(kind) = script.failures.pop_front() {
            return Err(Error::Io(io::Error::new(kind, "scripted ingest failure")));
        }

        let cursor = script.cursor;
        let Some(front) = script.chunks.front() else {
            return if script.closed {
                Err(Error::StreamClosed)
            } else {
                Ok(0)
            };
        };

        let remaining = &front[cursor..];
        let n = remaining.len().min(dst.len());
        dst[..n].copy_from_slice(&remaining[..n]);
        let finished = n == remaining.len();

        if finished {
            script.chunks.pop_front();
            script.cursor = 0;
        } else {
            script.cursor += n;
        }
        script.reads += 1;
        script.bytes_delivered += n;
        Ok(n)
    }
}

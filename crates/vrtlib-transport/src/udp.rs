//! UDP ingest for VITA-49 data streams.
//!
//! This module provides [`UdpIngest`], the production
//! [`IngestSource`](vrtlib_core::IngestSource). A background tokio task
//! reads datagrams off the socket into a bounded queue; the demultiplexer
//! thread drains that queue without blocking through
//! [`IngestSource::next_buffer`], which concatenates as many queued
//! datagrams as fit into the caller's buffer.
//!
//! When the queue is full, new datagrams are discarded and counted. The
//! loss shows up downstream as frame and packet counter gaps.
//!
//! # Example
//!
//! ```no_run
//! use vrtlib_transport::UdpIngest;
//!
//! # async fn example() -> vrtlib_core::Result<()> {
//! let ingest = UdpIngest::builder()
//!     .bind("0.0.0.0:4991")
//!     .queue_depth(8192)
//!     .build()
//!     .await?;
//! println!("listening on {}", ingest.local_addr());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::CancellationToken;

use vrtlib_core::{Error, IngestSource, Result};

/// Default bind address: any interface, any port.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";

/// Default number of datagrams held between the socket and the reader.
const DEFAULT_QUEUE_DEPTH: usize = 4096;

/// Default receive buffer, large enough for any UDP datagram.
const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65_536;

/// Pause after the first failed receive.
const RECV_RETRY_MIN: Duration = Duration::from_millis(1);

/// Longest pause between failed receives.
const RECV_RETRY_MAX: Duration = Duration::from_millis(500);

/// Doubling delay between consecutive receive failures.
#[derive(Debug, Default)]
struct RetryBackoff {
    failures: u32,
}

impl RetryBackoff {
    /// Record a failure and return how long to wait before the next try.
    fn failed(&mut self) -> Duration {
        let delay = RECV_RETRY_MIN
            .saturating_mul(1 << self.failures.min(16))
            .min(RECV_RETRY_MAX);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    fn succeeded(&mut self) {
        self.failures = 0;
    }

    fn failures(&self) -> u32 {
        self.failures
    }
}

/// Counters kept by the receive task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpIngestStats {
    /// Datagrams read off the socket.
    pub datagrams_received: u64,
    /// Datagrams discarded because the queue was full.
    pub datagrams_dropped: u64,
    /// Bytes read off the socket, including dropped datagrams.
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams_received: AtomicU64,
    datagrams_dropped: AtomicU64,
    bytes_received: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> UdpIngestStats {
        UdpIngestStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Builder for [`UdpIngest`].
#[derive(Debug, Clone)]
pub struct UdpIngestBuilder {
    bind_addr: String,
    source: Option<SocketAddr>,
    queue_depth: usize,
    max_datagram_size: usize,
}

impl Default for UdpIngestBuilder {
    fn default() -> Self {
        UdpIngestBuilder {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            source: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl UdpIngestBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local `host:port` to bind (default: `0.0.0.0:0`).
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Only accept datagrams from `addr` (default: any source).
    pub fn source(mut self, addr: SocketAddr) -> Self {
        self.source = Some(addr);
        self
    }

    /// Set how many datagrams may wait for the reader (default: 4096).
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the largest datagram accepted in bytes (default: 65536).
    ///
    /// Longer datagrams are truncated by the socket.
    pub fn max_datagram_size(mut self, bytes: usize) -> Self {
        self.max_datagram_size = bytes;
        self
    }

    /// Bind the socket and start the receive task.
    ///
    /// Must be called from within a tokio runtime; the receive task runs on
    /// it until the returned ingest is dropped or shut down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero queue depth or
    /// datagram size, and [`Error::Io`] if the socket cannot be bound or
    /// connected.
    pub async fn build(self) -> Result<UdpIngest> {
        if self.queue_depth == 0 {
            return Err(Error::InvalidParameter(
                "queue_depth must be non-zero".into(),
            ));
        }
        if self.max_datagram_size == 0 {
            return Err(Error::InvalidParameter(
                "max_datagram_size must be non-zero".into(),
            ));
        }

        tracing::debug!(addr = %self.bind_addr, "Binding UDP ingest socket");

        let socket = UdpSocket::bind(&self.bind_addr).await.map_err(|e| {
            tracing::error!(addr = %self.bind_addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        if let Some(source) = self.source {
            socket.connect(source).await.map_err(|e| {
                tracing::error!(
                    local = %local_addr,
                    remote = %source,
                    error = %e,
                    "Failed to connect UDP socket"
                );
                Error::Io(e)
            })?;
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        tokio::spawn(receive_loop(
            socket,
            tx,
            cancel.clone(),
            Arc::clone(&counters),
            self.max_datagram_size,
        ));

        tracing::debug!(
            local_addr = %local_addr,
            queue_depth = self.queue_depth,
            "UDP ingest started"
        );

        Ok(UdpIngest {
            local_addr,
            rx,
            pending: None,
            cancel,
            counters,
        })
    }
}

/// Datagram-fed ingest source backed by a tokio [`UdpSocket`].
pub struct UdpIngest {
    local_addr: SocketAddr,
    rx: mpsc::Receiver<Vec<u8>>,
    /// A dequeued datagram (or its unread tail) that did not fit last time.
    pending: Option<Vec<u8>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl UdpIngest {
    /// Start configuring a UDP ingest.
    pub fn builder() -> UdpIngestBuilder {
        UdpIngestBuilder::new()
    }

    /// Bind to `addr` with default queue settings.
    pub async fn bind(addr: &str) -> Result<Self> {
        UdpIngestBuilder::new().bind(addr).build().await
    }

    /// The local address the socket is bound to.
    ///
    /// Useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Snapshot the receive counters.
    pub fn stats(&self) -> UdpIngestStats {
        self.counters.snapshot()
    }

    /// Stop the receive task.
    ///
    /// Datagrams already queued are still delivered; after that
    /// [`next_buffer`](IngestSource::next_buffer) reports
    /// [`Error::StreamClosed`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn next_datagram(&mut self) -> Option<std::result::Result<Vec<u8>, TryRecvError>> {
        if let Some(datagram) = self.pending.take() {
            return Some(Ok(datagram));
        }
        match self.rx.try_recv() {
            Ok(datagram) => Some(Ok(datagram)),
            Err(TryRecvError::Empty) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl IngestSource for UdpIngest {
    fn next_buffer(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        while let Some(next) = self.next_datagram() {
            let mut datagram = match next {
                Ok(datagram) => datagram,
                Err(_) if written > 0 => break,
                Err(_) => {
                    tracing::debug!(local = %self.local_addr, "UDP ingest closed");
                    return Err(Error::StreamClosed);
                }
            };

            let room = dst.len() - written;
            if datagram.len() <= room {
                dst[written..written + datagram.len()].copy_from_slice(&datagram);
                written += datagram.len();
                continue;
            }

            // Whole datagrams only, unless this one alone exceeds the buffer.
            if written == 0 {
                dst.copy_from_slice(&datagram[..room]);
                datagram.drain(..room);
                written = room;
            }
            self.pending = Some(datagram);
            break;
        }

        if written > 0 {
            tracing::trace!(local = %self.local_addr, bytes = written, "Delivered ingest block");
        }
        Ok(written)
    }
}

impl Drop for UdpIngest {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for UdpIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpIngest")
            .field("local_addr", &self.local_addr)
            .field("pending", &self.pending.as_ref().map(Vec::len))
            .field("stats", &self.stats())
            .finish()
    }
}

async fn receive_loop(
    socket: UdpSocket,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    max_datagram_size: usize,
) {
    let mut buf = vec![0u8; max_datagram_size];
    let mut backoff = RetryBackoff::default();

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = socket.recv(&mut buf) => r,
        };

        let n = match received {
            Ok(n) => {
                backoff.succeeded();
                n
            }
            Err(e) => {
                let delay = backoff.failed();
                if backoff.failures() == 1 {
                    tracing::warn!(error = %e, "Failed to receive datagram");
                } else {
                    tracing::trace!(error = %e, failures = backoff.failures(), "Receive still failing");
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        };

        counters.datagrams_received.fetch_add(1, Ordering::Relaxed);
        counters.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

        match tx.try_send(buf[..n].to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = counters.datagrams_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(bytes = n, dropped, "Ingest queue full, datagram dropped");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    tracing::debug!("UDP receive task exiting");
}

//! The complex manager: demux thread, channel buffers and the consumer API.
//!
//! # Threads
//!
//! - The **demux thread** pulls raw bytes from the [`IngestSource`], decodes
//!   frames, tracks loss and admits packets into each channel's active
//!   buffer. It is the only thread that changes buffer bookkeeping apart
//!   from read cursors.
//! - **Workers** convert one packet's payload to floats at a reserved
//!   offset in the active buffer.
//! - **Consumers** call [`ComplexManager::fill_buffers`] and copy from the
//!   inactive buffers.
//!
//! Flips and reconfiguration are commands sent to the demux thread, which
//! waits for every worker to go idle, applies the change and acknowledges.
//! A consumer only reads after that acknowledgement, so it never sees a
//! buffer that a worker may still write.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use vrtlib_codec::{parse_frame_with, PacketType, VrtPacket, FRAME_COUNT_MODULUS};
use vrtlib_core::{
    AlignedBuffer, AlignedBufferPool, ChannelId, ComplexSample, Error, IngestSource, Result,
    StreamEvent,
};

use crate::builder::{ComplexManagerBuilder, DemuxConfig};
use crate::channel::ChannelState;
use crate::convert::{convert_samples, sample_count};
use crate::sequence::{Continuity, CounterTracker};
use crate::staging::OverflowStaging;
use crate::stats::{bump, StatsSnapshot, StreamStats};
use crate::worker::WorkerPool;

type SampleBuffer = Arc<Mutex<AlignedBuffer<ComplexSample>>>;

enum Command {
    Flip { ack: Sender<()> },
    Reconfigure { active: Vec<bool>, ack: Sender<()> },
}

struct Shared {
    config: DemuxConfig,
    channels: Mutex<Vec<ChannelState>>,
    /// Two buffers per channel, indexed by the channel's active/inactive slot.
    buffers: Vec<[SampleBuffer; 2]>,
    stats: StreamStats,
    events: broadcast::Sender<StreamEvent>,
    shutdown: AtomicBool,
    running: AtomicBool,
    reconfigures_pending: AtomicUsize,
}

impl Shared {
    fn emit(&self, event: StreamEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Flip every captured channel that asked for it.
    ///
    /// No worker may be writing while this runs.
    fn apply_flip(&self) {
        let flipped: Vec<ChannelId> = {
            let mut states = self.channels.lock();
            states
                .iter_mut()
                .enumerate()
                .filter(|(_, ch)| ch.valid && ch.flip_requested())
                .filter_map(|(i, ch)| {
                    ch.flip();
                    ChannelId::from_index(i)
                })
                .collect()
        };
        if !flipped.is_empty() {
            tracing::trace!(channels = ?flipped, "buffers flipped");
            bump(&self.stats.flips, 1);
            self.emit(StreamEvent::Flipped { channels: flipped });
        }
    }

    /// Whether a flip would expose samples that are not yet readable.
    fn flip_has_samples(&self) -> bool {
        self.channels
            .lock()
            .iter()
            .any(|ch| ch.valid && ch.flip_requested() && ch.written() > 0)
    }
}

/// Demultiplexes a VRL stream into per-channel complex sample buffers.
///
/// Created with [`ComplexManagerBuilder`]. Dropping the manager stops it.
pub struct ComplexManager {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    fill_lock: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ComplexManager {
    /// Start building a manager.
    pub fn builder() -> ComplexManagerBuilder {
        ComplexManagerBuilder::new()
    }

    pub(crate) fn start<I>(config: DemuxConfig, ingest: I) -> Result<Self>
    where
        I: IngestSource + 'static,
    {
        let n = config.channel_count;
        let pool = AlignedBufferPool::<ComplexSample>::allocate(
            2 * n,
            config.channel_capacity,
            config.alignment,
        )?;
        let mut all = pool.into_buffers().into_iter().map(|b| Arc::new(Mutex::new(b)));
        let first: Vec<SampleBuffer> = all.by_ref().take(n).collect();
        let buffers = first.into_iter().zip(all).map(|(a, b)| [a, b]).collect();

        let mut channels = vec![ChannelState::new(config.channel_capacity); n];
        for ch in &config.active_channels {
            let state = &mut channels[ch.index()];
            state.pending_valid = true;
            state.valid = true;
        }

        let workers = WorkerPool::new(config.worker_count)?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (commands_tx, commands_rx) = channel::unbounded();

        let shared = Arc::new(Shared {
            channels: Mutex::new(channels),
            buffers,
            stats: StreamStats::default(),
            events,
            shutdown: AtomicBool::new(false),
            running: AtomicBool::new(true),
            reconfigures_pending: AtomicUsize::new(0),
            config,
        });

        let demux = Demux {
            staging: OverflowStaging::new(shared.config.staging_capacity),
            frame_counter: CounterTracker::new(FRAME_COUNT_MODULUS),
            shared: Arc::clone(&shared),
            ingest,
            commands: commands_rx,
            workers,
        };

        let handle = thread::Builder::new()
            .name("vrtlib-demux".into())
            .spawn(move || demux.run())?;

        tracing::debug!(
            channels = shared.config.channel_count,
            workers = shared.config.worker_count,
            capacity = shared.config.channel_capacity,
            "complex manager started"
        );

        Ok(ComplexManager {
            shared,
            commands: commands_tx,
            fill_lock: Mutex::new(()),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> &DemuxConfig {
        &self.shared.config
    }

    /// Whether the demux thread is still running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Subscribe to loss and state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.events.subscribe()
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Channels currently selected for capture.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.shared
            .channels
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.valid)
            .filter_map(|(i, _)| ChannelId::from_index(i))
            .collect()
    }

    /// Samples readable from `channel` without a flip. Zero for unknown
    /// channels.
    pub fn unread(&self, channel: ChannelId) -> usize {
        self.shared
            .channels
            .lock()
            .get(channel.index())
            .map_or(0, ChannelState::unread)
    }

    /// Replace the set of captured channels.
    ///
    /// Blocks until the demux thread has applied the change. Every channel's
    /// buffers are reset, discarding unread samples. Ids outside the
    /// configured range are ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if the manager has stopped.
    pub fn update_tuners(&self, channels: &[ChannelId]) -> Result<()> {
        let n = self.shared.config.channel_count;
        let mut active = vec![false; n];
        for ch in channels {
            match active.get_mut(ch.index()) {
                Some(slot) => *slot = true,
                None => tracing::warn!(channel = %ch, "ignoring channel outside configured range"),
            }
        }

        self.shared.reconfigures_pending.fetch_add(1, Ordering::AcqRel);
        let result = {
            let _fill = self.fill_lock.lock();
            self.send_command(|ack| Command::Reconfigure { active, ack })
        };
        self.shared.reconfigures_pending.fetch_sub(1, Ordering::AcqRel);
        result
    }

    /// Copy up to `requested` samples per channel into `buffers`.
    ///
    /// `buffers[i]` receives samples of `channels[i]`. The count returned is
    /// the same for every channel: the smallest unread count across all
    /// captured channels, capped by `requested` and by the shortest
    /// destination. When some captured channel has nothing unread, the
    /// manager asks the demux thread to flip and tries again, up to the
    /// configured retry budget, after which it returns `Ok(0)`.
    ///
    /// Returns `Ok(0)` immediately while a reconfiguration is pending, when
    /// no channel is requested, or when no channel is captured.
    ///
    /// After the ingest source closes, the samples still held in the
    /// channel buffers remain readable; the manager flips them itself since
    /// no demux thread is left to do it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the slice counts differ or a
    ///   requested channel is unknown or not captured.
    /// - [`Error::NotRunning`] once [`stop`](Self::stop) has run, or once a
    ///   closed stream has nothing left to read.
    pub fn fill_buffers(
        &self,
        buffers: &mut [&mut [ComplexSample]],
        channels: &[ChannelId],
        requested: usize,
    ) -> Result<usize> {
        if buffers.len() != channels.len() {
            return Err(Error::InvalidParameter(format!(
                "{} destination buffers for {} channels",
                buffers.len(),
                channels.len()
            )));
        }
        let n = self.shared.config.channel_count;
        if let Some(ch) = channels.iter().find(|ch| ch.index() >= n) {
            return Err(Error::InvalidParameter(format!(
                "channel {ch} is outside the {n} configured channels"
            )));
        }
        if channels.is_empty() {
            return Ok(0);
        }
        let requested = buffers
            .iter()
            .map(|b| b.len())
            .fold(requested, usize::min);

        let Some(_fill) = self.lock_for_fill() else {
            return Ok(0);
        };

        for attempt in 0..self.shared.config.max_fill_retries {
            if self.shared.reconfigures_pending.load(Ordering::Acquire) > 0 {
                return Ok(0);
            }
            let closed = !self.is_running();
            if closed && self.shared.shutting_down() {
                return Err(Error::NotRunning);
            }

            match self.plan_read(channels, requested)? {
                ReadPlan::NothingCaptured if closed => return Err(Error::NotRunning),
                ReadPlan::NothingCaptured => return Ok(0),
                ReadPlan::NeedFlip if closed => {
                    // The demux thread has exited and its workers are joined.
                    if !self.shared.flip_has_samples() {
                        return Err(Error::NotRunning);
                    }
                    self.shared.apply_flip();
                }
                ReadPlan::NeedFlip => {
                    tracing::trace!(attempt, "requesting buffer flip");
                    self.send_command(|ack| Command::Flip { ack })?;
                }
                ReadPlan::Ready { count, sources } => {
                    self.copy_out(buffers, channels, &sources, count);
                    return Ok(count);
                }
            }
        }

        tracing::trace!("fill retry budget exhausted");
        Ok(0)
    }

    /// Stop the demux thread after in-flight conversions finish.
    ///
    /// Idempotent. Also runs on drop.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                tracing::error!("demux thread panicked");
            }
            self.shared.running.store(false, Ordering::Release);
        }
    }

    /// Take the fill lock, giving up as soon as a reconfiguration is
    /// pending.
    fn lock_for_fill(&self) -> Option<MutexGuard<'_, ()>> {
        loop {
            if self.shared.reconfigures_pending.load(Ordering::Acquire) > 0 {
                return None;
            }
            if let Some(guard) = self.fill_lock.try_lock_for(self.shared.config.short_backoff) {
                return Some(guard);
            }
        }
    }

    fn plan_read(&self, channels: &[ChannelId], requested: usize) -> Result<ReadPlan> {
        let mut states = self.shared.channels.lock();

        let mut min: Option<usize> = None;
        let mut empty = false;
        for ch in states.iter_mut().filter(|ch| ch.valid) {
            let unread = ch.unread();
            if unread == 0 {
                ch.request_flip();
                empty = true;
            }
            min = Some(min.map_or(unread, |m| m.min(unread)));
        }

        let Some(min) = min else {
            return Ok(ReadPlan::NothingCaptured);
        };
        if empty {
            return Ok(ReadPlan::NeedFlip);
        }

        let mut sources = Vec::with_capacity(channels.len());
        for ch in channels {
            let state = &states[ch.index()];
            if !state.valid {
                return Err(Error::InvalidParameter(format!(
                    "channel {ch} is not captured"
                )));
            }
            sources.push((state.inactive(), state.read_cursor()));
        }

        Ok(ReadPlan::Ready {
            count: min.min(requested),
            sources,
        })
    }

    fn copy_out(
        &self,
        buffers: &mut [&mut [ComplexSample]],
        channels: &[ChannelId],
        sources: &[(usize, usize)],
        count: usize,
    ) {
        for ((dst, ch), &(slot, cursor)) in buffers.iter_mut().zip(channels).zip(sources) {
            let src = self.shared.buffers[ch.index()][slot].lock();
            dst[..count].copy_from_slice(&src[cursor..cursor + count]);
        }

        let mut states = self.shared.channels.lock();
        let mut done = vec![false; states.len()];
        for ch in channels {
            if !std::mem::replace(&mut done[ch.index()], true) {
                states[ch.index()].consume(count);
            }
        }
    }

    fn send_command(&self, make: impl FnOnce(Sender<()>) -> Command) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.commands
            .send(make(ack_tx))
            .map_err(|_| Error::NotRunning)?;
        ack_rx.recv().map_err(|_| Error::NotRunning)
    }
}

impl Drop for ComplexManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ComplexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexManager")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish()
    }
}

enum ReadPlan {
    NothingCaptured,
    NeedFlip,
    Ready {
        count: usize,
        /// Per requested channel: inactive slot and read cursor.
        sources: Vec<(usize, usize)>,
    },
}

/// State owned by the demux thread.
struct Demux<I> {
    shared: Arc<Shared>,
    ingest: I,
    commands: Receiver<Command>,
    workers: WorkerPool,
    staging: OverflowStaging,
    frame_counter: CounterTracker,
}

impl<I: IngestSource> Demux<I> {
    fn run(mut self) {
        let start = self.shared.config.staging_capacity;
        let mut window = vec![0u8; start + self.shared.config.ingest_buffer_size];
        let long = self.shared.config.long_backoff;

        tracing::debug!("demux thread started");

        while !self.shared.shutting_down() {
            self.service_commands();

            let len = match self.ingest.next_buffer(&mut window[start..]) {
                Ok(0) => {
                    self.wait_for_command(long);
                    continue;
                }
                Ok(n) => n.min(window.len() - start),
                Err(Error::StreamClosed) => {
                    tracing::debug!("ingest closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ingest read failed");
                    self.wait_for_command(long);
                    continue;
                }
            };

            if !self.process_window(&mut window, start, start + len) {
                break;
            }
        }

        self.drain();
    }

    /// Decode every complete frame in `window[start..end]`, after first
    /// prepending any staged bytes. Returns `false` if shutdown interrupted
    /// dispatch.
    fn process_window(&mut self, window: &mut [u8], start: usize, end: usize) -> bool {
        let mut index = match self.staging.take_into(window, start) {
            Ok(begin) => begin,
            Err(e) => {
                tracing::error!(error = %e, "dropping staged bytes");
                self.staging.clear();
                start
            }
        };
        let order = self.shared.config.byte_order;

        while index < end {
            if self.shared.shutting_down() {
                return false;
            }
            self.service_commands();

            let parsed = parse_frame_with(&window[index..end], order);
            match parsed {
                Ok((frame, skipped)) => {
                    if skipped > 0 {
                        tracing::debug!(skipped_words = skipped, "skipped bytes before frame");
                    }
                    self.observe_frame(frame.frame_count());
                    for packet in frame.packets() {
                        if !self.dispatch(packet) {
                            return false;
                        }
                    }
                    index += skipped * vrtlib_codec::WORD_SIZE + frame.size_bytes();
                }
                Err(e) if e.is_recoverable() => {
                    self.stage(&window[index..end]);
                    break;
                }
                Err(Error::NoAlignmentWord { scanned }) => {
                    tracing::debug!(scanned, "no alignment word in window");
                    self.stage(&window[index + scanned..end]);
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, offset = index, "skipping rest of window");
                    bump(&self.shared.stats.parse_errors, 1);
                    break;
                }
            }
        }
        true
    }

    fn stage(&mut self, tail: &[u8]) {
        match self.staging.stash(tail) {
            Ok(()) => {
                tracing::trace!(bytes = tail.len(), "staged split frame");
                bump(&self.shared.stats.bytes_staged, tail.len() as u64);
            }
            Err(e) => {
                tracing::error!(error = %e, "split frame larger than staging area, dropped");
                bump(&self.shared.stats.parse_errors, 1);
            }
        }
    }

    fn observe_frame(&mut self, count: u16) {
        bump(&self.shared.stats.frames_parsed, 1);
        if let Continuity::Gap {
            expected,
            observed,
            missing,
        } = self.frame_counter.observe(count)
        {
            tracing::warn!(expected, observed, missing, "frame loss");
            bump(&self.shared.stats.frame_loss_events, 1);
            self.shared.emit(StreamEvent::FrameLoss { expected, observed });
        }
    }

    /// Admit one packet and hand it to a worker. Returns `false` if shutdown
    /// interrupted the wait for capacity or a worker.
    fn dispatch(&mut self, packet: &VrtPacket<'_>) -> bool {
        if packet.packet_type() != PacketType::IfData {
            tracing::trace!(packet_type = ?packet.packet_type(), "ignoring non-IF-data packet");
            return true;
        }
        let Ok(stream_id) = packet.stream_id() else {
            return true;
        };

        let channel = ChannelId::from_stream_id(stream_id);
        let idx = channel.index();
        if idx >= self.shared.config.channel_count {
            tracing::warn!(stream_id, %channel, "stream id outside configured channels");
            bump(&self.shared.stats.dropped_bad_channel, 1);
            return true;
        }

        let samples = sample_count(packet.payload_size());
        let (slot, offset, continuity) = loop {
            {
                let mut states = self.shared.channels.lock();
                let state = &mut states[idx];
                if !state.valid {
                    tracing::trace!(%channel, "packet for channel not captured");
                    bump(&self.shared.stats.dropped_inactive_channel, 1);
                    return true;
                }
                if !state.could_ever_admit(samples) {
                    tracing::warn!(%channel, samples, "packet larger than channel buffer");
                    bump(&self.shared.stats.dropped_oversized, 1);
                    return true;
                }
                if state.can_admit(samples) {
                    let continuity = state.observe_packet_count(packet.packet_count());
                    let offset = state.admit(samples);
                    break (state.active(), offset, continuity);
                }
            }

            // Active buffer full: hold the packet until a consumer flips.
            if self.shared.shutting_down() {
                return false;
            }
            self.wait_for_command(self.shared.config.short_backoff);
        };

        bump(&self.shared.stats.packets_parsed, 1);
        bump(&self.shared.stats.samples_admitted, samples as u64);
        if let Continuity::Gap {
            expected,
            observed,
            missing,
        } = continuity
        {
            tracing::warn!(%channel, expected, observed, missing, "packet loss");
            bump(&self.shared.stats.packet_loss_events, 1);
            bump(&self.shared.stats.packets_lost, missing as u64);
            self.shared.emit(StreamEvent::PacketLoss {
                channel,
                expected: expected as u8,
                observed: observed as u8,
                lost: missing as u8,
            });
        }

        self.convert(idx, slot, offset, packet.payload(), samples)
    }

    fn convert(
        &mut self,
        idx: usize,
        slot: usize,
        offset: usize,
        payload: &[u8],
        samples: usize,
    ) -> bool {
        let worker = loop {
            if let Some(id) = self.workers.idle_worker() {
                break id;
            }
            if self.shared.shutting_down() {
                tracing::debug!("no idle worker during shutdown, abandoning window");
                return false;
            }
            thread::sleep(self.shared.config.short_backoff);
        };

        let buffer = Arc::clone(&self.shared.buffers[idx][slot]);
        let order = self.shared.config.byte_order;
        let data = payload.to_vec();
        let task = move || {
            let mut dst = buffer.lock();
            convert_samples(&data, order, &mut dst[offset..offset + samples]);
        };

        if let Err(e) = self.workers.wake(worker, task) {
            tracing::error!(error = %e, worker, "failed to dispatch conversion");
        }
        true
    }

    fn service_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }
    }

    fn wait_for_command(&mut self, timeout: Duration) {
        match self.commands.recv_timeout(timeout) {
            Ok(command) => self.handle(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(timeout),
        }
    }

    fn handle(&mut self, command: Command) {
        self.workers.wait_idle(self.shared.config.short_backoff);

        match command {
            Command::Flip { ack } => {
                self.shared.apply_flip();
                let _ = ack.send(());
            }
            Command::Reconfigure { active, ack } => {
                {
                    let mut states = self.shared.channels.lock();
                    for (state, on) in states.iter_mut().zip(&active) {
                        state.pending_valid = *on;
                        state.reset();
                    }
                }
                let active: Vec<ChannelId> = active
                    .iter()
                    .enumerate()
                    .filter(|(_, on)| **on)
                    .filter_map(|(i, _)| ChannelId::from_index(i))
                    .collect();
                tracing::debug!(channels = ?active, "channels reconfigured");
                bump(&self.shared.stats.reconfigurations, 1);
                self.shared.emit(StreamEvent::Reconfigured { active });
                let _ = ack.send(());
            }
        }
    }

    fn drain(&mut self) {
        self.workers.wait_idle(self.shared.config.short_backoff);
        self.workers.stop();
        self.shared.emit(StreamEvent::Stopped);
        self.shared.running.store(false, Ordering::Release);
        tracing::debug!("demux thread stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Ingest that replays fixed chunks, then reports nothing available.
    struct Chunks(VecDeque<Vec<u8>>);

    impl IngestSource for Chunks {
        fn next_buffer(&mut self, dst: &mut [u8]) -> Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    dst[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn frame(count: u16, stream_id: u32, pkt_count: u8, payload: &[u32]) -> Vec<u8> {
        let header = vrtlib_codec::VrtHeader::default()
            .with_packet_type(PacketType::IfData)
            .with_packet_count(pkt_count)
            .with_packet_size(payload.len() as u16 + 2);
        let size = payload.len() as u32 + 5;
        let mut words = vec![
            vrtlib_codec::ALIGNMENT_VRLP,
            vrtlib_codec::VrlFrameInfo::new(count, size).word(),
            header.word(),
            stream_id,
        ];
        words.extend_from_slice(payload);
        words.push(vrtlib_codec::TRAILER_VEND);
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    fn manager(chunks: Vec<Vec<u8>>) -> ComplexManager {
        ComplexManagerBuilder::new()
            .channel_count(2)
            .channel_capacity(64)
            .active_channels(&[ChannelId::FIRST])
            .build(Chunks(chunks.into()))
            .unwrap()
    }

    fn wait_for(mgr: &ComplexManager, pred: impl Fn(&StatsSnapshot) -> bool) {
        for _ in 0..2000 {
            if pred(&mgr.stats()) {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached: {:?}", mgr.stats());
    }

    #[test]
    fn converts_and_delivers_after_flip() {
        let mgr = manager(vec![frame(0, 0, 0, &[0x4000_C000; 4])]);
        wait_for(&mgr, |s| s.samples_admitted == 4);

        let mut out = [ComplexSample::default(); 8];
        let n = mgr
            .fill_buffers(&mut [&mut out[..]], &[ChannelId::FIRST], 8)
            .unwrap();
        assert_eq!(n, 4);
        for s in &out[..4] {
            assert_eq!(*s, ComplexSample::new(0.5, -0.5));
        }
        assert_eq!(mgr.stats().flips, 1);
    }

    #[test]
    fn mismatched_slices_rejected() {
        let mgr = manager(vec![]);
        let mut out = [ComplexSample::default(); 1];
        let err = mgr
            .fill_buffers(&mut [&mut out[..]], &[], 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn unknown_channel_rejected() {
        let mgr = manager(vec![]);
        let mut out = [ComplexSample::default(); 1];
        let ch = ChannelId::new(3).unwrap();
        assert!(matches!(
            mgr.fill_buffers(&mut [&mut out[..]], &[ch], 1),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn bad_and_inactive_channels_counted() {
        let mut chunk = frame(0, 5, 0, &[0; 2]); // channel 6: out of range
        chunk.extend(frame(1, 1, 0, &[0; 2])); // channel 2: not captured
        let mgr = manager(vec![chunk]);
        wait_for(&mgr, |s| s.dropped_bad_channel == 1 && s.dropped_inactive_channel == 1);
        let stats = mgr.stats();
        assert_eq!(stats.frames_parsed, 2);
        assert_eq!(stats.samples_admitted, 0);
    }

    #[test]
    fn oversized_packet_dropped() {
        let mgr = manager(vec![frame(0, 0, 0, &[0; 64])]);
        wait_for(&mgr, |s| s.dropped_oversized == 1);
        assert_eq!(mgr.stats().samples_admitted, 0);
    }

    #[test]
    fn context_packets_ignored() {
        let mut bytes = frame(0, 0, 0, &[0; 2]);
        bytes[8] = (bytes[8] & 0x0F) | 0x40; // IF context
        let mgr = manager(vec![bytes]);
        wait_for(&mgr, |s| s.frames_parsed == 1);
        thread::sleep(Duration::from_millis(5));
        let stats = mgr.stats();
        assert_eq!(stats.packets_parsed, 0);
        assert_eq!(stats.dropped_inactive_channel + stats.dropped_bad_channel, 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mgr = manager(vec![]);
        assert!(mgr.is_running());
        mgr.stop();
        mgr.stop();
        assert!(!mgr.is_running());
        let mut out = [ComplexSample::default(); 1];
        assert!(matches!(
            mgr.fill_buffers(&mut [&mut out[..]], &[ChannelId::FIRST], 1),
            Err(Error::NotRunning)
        ));
        assert!(matches!(mgr.update_tuners(&[]), Err(Error::NotRunning)));
    }

    #[test]
    fn no_captured_channels_returns_zero() {
        let mgr = manager(vec![]);
        mgr.update_tuners(&[]).unwrap();
        assert!(mgr.active_channels().is_empty());
        let mut out = [ComplexSample::default(); 4];
        assert_eq!(
            mgr.fill_buffers(&mut [&mut out[..]], &[ChannelId::FIRST], 4)
                .unwrap(),
            0
        );
    }
}

// vrtlib test application -- CLI tool for exercising the VITA-49 decoder
// and demultiplexer against a live radio, a synthetic lossy stream, or a
// raw capture file.
//
// Usage:
//   vrtlib-test-app capture --bind 0.0.0.0:4991 --channel-count 4 --channel 1 --channel 2
//   vrtlib-test-app capture --bind 0.0.0.0:4991 --duration 30 --workers 4
//   vrtlib-test-app synth --frames 500 --packets-per-frame 8 --channels 2 --drop-rate 0.02
//   vrtlib-test-app synth --seed 7 --max-chunk 64
//   vrtlib-test-app inspect capture.vrl
//   vrtlib-test-app inspect --little-endian --max-frames 10 capture.vrl
//
// Logging is controlled with RUST_LOG, e.g. RUST_LOG=vrtlib_demux=debug.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast::error::TryRecvError;

use vrtlib::codec::{
    parse_frame_with, FRAME_COUNT_MODULUS, FRAME_OVERHEAD_WORDS, PACKET_COUNT_MODULUS, WORD_SIZE,
};
use vrtlib::demux::{ComplexManager, ComplexManagerBuilder, StatsSnapshot};
use vrtlib::transport::UdpIngest;
use vrtlib::{ByteOrder, ChannelId, ComplexSample, Error, StreamEvent};
use vrtlib_test_harness::{MockIngest, VrlFrameBuilder, VrtPacketBuilder};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// vrtlib test application -- exercises the VITA-49 pipeline from the command line.
#[derive(Parser)]
#[command(name = "vrtlib-test-app", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a live UDP stream and report throughput and loss once per second.
    Capture {
        /// Local address to listen on.
        #[arg(long, default_value = "0.0.0.0:4991")]
        bind: String,

        /// Number of tuners the radio streams (stream ids 0..N).
        #[arg(long, default_value_t = 1)]
        channel_count: usize,

        /// Channel to capture (1-based); repeat for several.
        #[arg(long = "channel", default_values_t = [1u16])]
        channels: Vec<u16>,

        /// Seconds to run; 0 runs until Ctrl-C.
        #[arg(long, default_value_t = 0)]
        duration: u64,

        /// Conversion worker threads.
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Datagrams queued between the socket and the demultiplexer.
        #[arg(long, default_value_t = 4096)]
        queue_depth: usize,

        /// The radio emits little-endian words.
        #[arg(long)]
        little_endian: bool,
    },

    /// Generate frames, drop packets at random and check the loss detector.
    Synth {
        /// Frames to generate.
        #[arg(long, default_value_t = 200)]
        frames: usize,

        /// Data packets per frame, assigned to channels round-robin.
        #[arg(long, default_value_t = 4)]
        packets_per_frame: usize,

        /// I/Q samples per packet.
        #[arg(long, default_value_t = 256)]
        samples: usize,

        /// Number of channels.
        #[arg(long, default_value_t = 1)]
        channels: usize,

        /// Probability that any one packet is dropped.
        #[arg(long, default_value_t = 0.01)]
        drop_rate: f64,

        /// Largest chunk handed to the demultiplexer in one read.
        #[arg(long, default_value_t = 1500)]
        max_chunk: usize,

        /// Conversion worker threads.
        #[arg(long, default_value_t = 2)]
        workers: usize,

        /// RNG seed; random if omitted.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Decode a raw capture file and print every frame and packet.
    Inspect {
        /// File holding raw VRL bytes.
        file: PathBuf,

        /// Words are little-endian.
        #[arg(long)]
        little_endian: bool,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<usize>,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn byte_order(little_endian: bool) -> ByteOrder {
    if little_endian {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

fn channel_ids(numbers: &[u16]) -> Result<Vec<ChannelId>> {
    numbers
        .iter()
        .map(|&n| ChannelId::new(n).context("channel numbers start at 1"))
        .collect()
}

fn print_stats(stats: &StatsSnapshot) {
    println!("  frames parsed:        {}", stats.frames_parsed);
    println!("  packets parsed:       {}", stats.packets_parsed);
    println!("  frame loss events:    {}", stats.frame_loss_events);
    println!("  packet loss events:   {}", stats.packet_loss_events);
    println!("  packets lost:         {}", stats.packets_lost);
    println!("  dropped (bad ch):     {}", stats.dropped_bad_channel);
    println!("  dropped (inactive):   {}", stats.dropped_inactive_channel);
    println!("  dropped (oversized):  {}", stats.dropped_oversized);
    println!("  parse errors:         {}", stats.parse_errors);
    println!("  flips:                {}", stats.flips);
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_capture(
    bind: &str,
    channel_count: usize,
    channels: &[u16],
    duration_secs: u64,
    workers: usize,
    queue_depth: usize,
    order: ByteOrder,
) -> Result<()> {
    let channels = channel_ids(channels)?;

    let ingest = UdpIngest::builder()
        .bind(bind)
        .queue_depth(queue_depth)
        .build()
        .await
        .with_context(|| format!("failed to listen on {bind}"))?;
    println!("Listening on {}", ingest.local_addr());

    let manager = Arc::new(
        ComplexManagerBuilder::new()
            .channel_count(channel_count)
            .worker_count(workers)
            .byte_order(order)
            .active_channels(&channels)
            .build(ingest)?,
    );
    let mut events = manager.subscribe();

    let done = Arc::new(AtomicBool::new(false));
    let delivered = Arc::new(AtomicU64::new(0));
    let consumer = {
        let manager = Arc::clone(&manager);
        let done = Arc::clone(&done);
        let delivered = Arc::clone(&delivered);
        let channels = channels.clone();
        thread::Builder::new()
            .name("capture-consumer".into())
            .spawn(move || consume(&manager, &channels, &done, &delivered))?
    };

    println!("Capturing {} (Ctrl-C to stop)...", {
        let names: Vec<String> = channels.iter().map(ToString::to_string).collect();
        names.join(", ")
    });

    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut last_samples = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }

        let mut frame_gaps = 0;
        let mut packet_gaps = 0;
        loop {
            match events.try_recv() {
                Ok(StreamEvent::FrameLoss { .. }) => frame_gaps += 1,
                Ok(StreamEvent::PacketLoss { .. }) => packet_gaps += 1,
                Ok(StreamEvent::Stopped) => println!("[event] stream stopped"),
                Ok(_) => {}
                Err(TryRecvError::Lagged(n)) => println!("[warning] missed {n} events"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        let samples = delivered.load(Ordering::Relaxed);
        let stats = manager.stats();
        println!(
            "{:>6.1}s  {:>10} S/s  frames={} F={} L={} lost={}",
            start.elapsed().as_secs_f64(),
            samples - last_samples,
            stats.frames_parsed,
            frame_gaps,
            packet_gaps,
            stats.packets_lost,
        );
        last_samples = samples;

        if !manager.is_running() {
            println!("Demultiplexer stopped.");
            break;
        }
        if duration_secs > 0 && start.elapsed() >= Duration::from_secs(duration_secs) {
            println!("Capture duration elapsed.");
            break;
        }
    }

    done.store(true, Ordering::Relaxed);
    match consumer.join() {
        Ok(Ok(())) | Ok(Err(Error::NotRunning)) => {}
        Ok(Err(e)) => return Err(e).context("consumer failed"),
        Err(_) => bail!("consumer thread panicked"),
    }

    let stats = manager.stats();
    manager.stop();

    println!("\nFinal counters:");
    print_stats(&stats);
    Ok(())
}

/// Pull samples until `done` is set. Counts samples per channel.
fn consume(
    manager: &ComplexManager,
    channels: &[ChannelId],
    done: &AtomicBool,
    delivered: &AtomicU64,
) -> vrtlib::Result<()> {
    const BLOCK: usize = 1 << 16;
    let mut storage = vec![vec![ComplexSample::default(); BLOCK]; channels.len()];

    while !done.load(Ordering::Relaxed) {
        let mut dst: Vec<&mut [ComplexSample]> =
            storage.iter_mut().map(|b| b.as_mut_slice()).collect();
        let n = manager.fill_buffers(&mut dst, channels, BLOCK)?;
        if n == 0 {
            thread::sleep(Duration::from_millis(2));
        }
        delivered.fetch_add(n as u64, Ordering::Relaxed);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_synth(
    frames: usize,
    packets_per_frame: usize,
    samples: usize,
    channels: usize,
    drop_rate: f64,
    max_chunk: usize,
    workers: usize,
    seed: Option<u64>,
) -> Result<()> {
    if !(0.0..=1.0).contains(&drop_rate) {
        bail!("--drop-rate must be between 0 and 1, got {drop_rate}");
    }
    if channels == 0 || max_chunk == 0 || packets_per_frame == 0 {
        bail!("--channels, --packets-per-frame and --max-chunk must be non-zero");
    }

    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    println!("Synthetic run, seed {seed}");

    // Build the stream, tracking what the manager should see.
    let mut stream = Vec::new();
    let mut counters = vec![0u16; channels];
    let mut injected = 0u64;
    let mut kept = 0u64;
    let mut expected_samples = vec![0usize; channels];

    for f in 0..frames {
        let mut frame =
            VrlFrameBuilder::new().frame_count((f % FRAME_COUNT_MODULUS as usize) as u16);
        for p in 0..packets_per_frame {
            let ch = p % channels;
            let count = counters[ch];
            counters[ch] = (count + 1) % PACKET_COUNT_MODULUS;
            if rng.gen_bool(drop_rate) {
                injected += 1;
                continue;
            }
            let iq: Vec<(i16, i16)> = (0..samples).map(|_| (rng.gen(), rng.gen())).collect();
            frame = frame.packet(
                VrtPacketBuilder::if_data(ch as u32)
                    .packet_count(count as u8)
                    .iq_samples(&iq),
            );
            expected_samples[ch] += samples;
            kept += 1;
        }
        stream.extend(frame.build());
    }

    let longest_frame =
        packets_per_frame * (samples + 2) * WORD_SIZE + FRAME_OVERHEAD_WORDS * WORD_SIZE;
    let capacity = expected_samples.iter().copied().max().unwrap_or(0) + samples + 2;
    let all: Vec<ChannelId> = (0..channels).filter_map(ChannelId::from_index).collect();

    let (ingest, handle) = MockIngest::new();
    let manager = ComplexManagerBuilder::new()
        .channel_count(channels)
        .channel_capacity(capacity)
        .worker_count(workers)
        .staging_capacity(longest_frame.max(65_536) * 2)
        .event_capacity(frames * packets_per_frame + 16)
        .active_channels(&all)
        .build(ingest)?;
    let mut events = manager.subscribe();

    let mut offset = 0;
    let mut chunks = 0usize;
    while offset < stream.len() {
        let len = rng.gen_range(1..=max_chunk).min(stream.len() - offset);
        handle.push(&stream[offset..offset + len]);
        offset += len;
        chunks += 1;
    }
    println!(
        "Fed {} bytes in {chunks} chunks ({frames} frames, {kept} packets kept)",
        stream.len()
    );

    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.stats().packets_parsed < kept {
        if Instant::now() >= deadline {
            bail!(
                "timed out: {} of {kept} packets parsed",
                manager.stats().packets_parsed
            );
        }
        thread::sleep(Duration::from_millis(1));
    }

    // A read returns the same count for every channel; whatever a channel
    // holds beyond that stays unread.
    let mut storage = vec![vec![ComplexSample::default(); capacity]; channels];
    let mut dst: Vec<&mut [ComplexSample]> =
        storage.iter_mut().map(|b| b.as_mut_slice()).collect();
    let n = manager.fill_buffers(&mut dst, &all, capacity)?;

    let mut mismatched = false;
    for (ch, expected) in all.iter().zip(&expected_samples) {
        let got = n + manager.unread(*ch);
        let marker = if got == *expected { "ok" } else { "MISMATCH" };
        println!("  {ch}: {got} samples (expected {expected}) {marker}");
        mismatched |= got != *expected;
    }

    let mut loss_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, StreamEvent::PacketLoss { .. }) {
            loss_events += 1;
        }
    }

    let stats = manager.stats();
    manager.stop();

    println!("Packets dropped:  {injected}");
    println!("Packets detected: {} in {loss_events} gaps", stats.packets_lost);
    if stats.packets_lost != injected {
        // Drops before a channel's first packet or after its last one leave
        // no counter gap; runs of 16 or more alias.
        println!("  (difference is drops at stream edges or aliased runs)");
    }
    print_stats(&stats);

    if mismatched {
        bail!("delivered sample counts differ from what was generated");
    }
    Ok(())
}

fn cmd_inspect(file: &Path, order: ByteOrder, max_frames: Option<usize>) -> Result<()> {
    let data =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    println!("{}: {} bytes", file.display(), data.len());

    let mut offset = 0;
    let mut frames = 0usize;
    let mut skipped = 0usize;

    while offset < data.len() {
        if max_frames.is_some_and(|max| frames >= max) {
            break;
        }

        match parse_frame_with(&data[offset..], order) {
            Ok((frame, skipped_words)) => {
                skipped += skipped_words * WORD_SIZE;
                println!("@{:<10} {frame}", offset + skipped_words * WORD_SIZE);
                for packet in frame.packets() {
                    println!("             {packet}");
                }
                offset += skipped_words * WORD_SIZE + frame.size_bytes();
                frames += 1;
            }
            Err(Error::NoAlignmentWord { scanned }) => {
                skipped += scanned.max(WORD_SIZE);
                offset += scanned.max(WORD_SIZE);
            }
            Err(e) if e.is_recoverable() => {
                println!("@{offset:<10} truncated: {e}");
                break;
            }
            Err(e) => {
                println!("@{offset:<10} error: {e}");
                skipped += WORD_SIZE;
                offset += WORD_SIZE;
            }
        }
    }

    println!("\n{frames} frames, {skipped} bytes skipped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Capture {
            bind,
            channel_count,
            channels,
            duration,
            workers,
            queue_depth,
            little_endian,
        } => {
            cmd_capture(
                &bind,
                channel_count,
                &channels,
                duration,
                workers,
                queue_depth,
                byte_order(little_endian),
            )
            .await
        }
        Command::Synth {
            frames,
            packets_per_frame,
            samples,
            channels,
            drop_rate,
            max_chunk,
            workers,
            seed,
        } => tokio::task::spawn_blocking(move || {
            cmd_synth(
                frames,
                packets_per_frame,
                samples,
                channels,
                drop_rate,
                max_chunk,
                workers,
                seed,
            )
        })
        .await
        .context("synth task failed")?,
        Command::Inspect {
            file,
            little_endian,
            max_frames,
        } => cmd_inspect(&file, byte_order(little_endian), max_frames),
    }
}

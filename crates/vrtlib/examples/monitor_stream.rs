//! Monitor a live VITA-49 stream.
//!
//! Demonstrates wiring a UDP ingest into a complex manager, pulling samples
//! from a consumer thread, and printing loss events as they arrive. This is
//! the skeleton of a real-time spectrum display or recorder.
//!
//! # Requirements
//!
//! - A radio streaming VRL frames to UDP port 4991 on this host
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=vrtlib=debug cargo run -p vrtlib --example monitor_stream
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use vrtlib::demux::ComplexManagerBuilder;
use vrtlib::transport::UdpIngest;
use vrtlib::{ChannelId, ComplexSample, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ingest = UdpIngest::bind("0.0.0.0:4991").await?;
    println!("Listening on {}", ingest.local_addr());

    let manager = Arc::new(
        ComplexManagerBuilder::new()
            .channel_count(2)
            .worker_count(2)
            .active_channels(&[ChannelId::FIRST])
            .build(ingest)?,
    );
    let mut events = manager.subscribe();

    // fill_buffers blocks, so the consumer gets its own thread.
    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let manager = Arc::clone(&manager);
        let done = Arc::clone(&done);
        thread::spawn(move || -> vrtlib::Result<u64> {
            let mut samples = vec![ComplexSample::default(); 1 << 16];
            let mut total = 0u64;
            while !done.load(Ordering::Relaxed) {
                let n = manager.fill_buffers(&mut [&mut samples[..]], &[ChannelId::FIRST], 1 << 16)?;
                if n == 0 {
                    thread::sleep(Duration::from_millis(5));
                }
                total += n as u64;
            }
            Ok(total)
        })
    };

    println!("Monitoring for 30 seconds...\n");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(StreamEvent::FrameLoss { expected, observed })) => {
                println!("[F] frame counter {expected} -> {observed}");
            }
            Ok(Ok(StreamEvent::PacketLoss { channel, lost, .. })) => {
                println!("[L] {channel}: {lost} packets lost");
            }
            Ok(Ok(_)) => {}
            Ok(Err(RecvError::Lagged(n))) => println!("[warning] missed {n} events"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => break,
        }
    }

    done.store(true, Ordering::Relaxed);
    let total = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer thread panicked"))??;

    let stats = manager.stats();
    manager.stop();

    println!("\nSamples read:   {total}");
    println!("Frames parsed:  {}", stats.frames_parsed);
    println!("Packets parsed: {}", stats.packets_parsed);
    println!("Packets lost:   {}", stats.packets_lost);

    Ok(())
}

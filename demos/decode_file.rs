//! Decode an image file for several consumers at once
//!
//! Run with: cargo run --example decode_file <PATH> [CONSUMERS]
//!
//! Examples:
//!   cargo run --example decode_file logo.gif          # two consumers
//!   cargo run --example decode_file photo.jpg 5       # five consumers
//!   RUST_LOG=imgstream_rs=trace cargo run --example decode_file icon.xbm
//!
//! Every consumer registers with decoding enabled; the first registration
//! queues the source, later ones either join the pass before its first
//! pixel block or wait for the next pass.

use std::sync::Arc;

use imgstream_rs::{
    CallerContext, ConsumerRef, FileProvider, ImageObserver, ImageSource, PoolConfig, WaitError, WorkerPool,
};

fn print_usage() {
    println!("Usage: decode_file <PATH> [CONSUMERS]");
    println!();
    println!("Decodes PATH (GIF, JPEG, PNG or XBM) on a background worker pool");
    println!("and reports what each consumer received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let path = &args[1];
    let consumers: usize = match args.get(2) {
        Some(n) => n.parse()?,
        None => 2,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imgstream_rs=info".parse()?)
                .add_directive("decode_file=info".parse()?),
        )
        .init();

    let pool = Arc::new(WorkerPool::with_config(
        PoolConfig::default().max_workers(2).thread_name("demo-decode"),
    ));
    let source = ImageSource::new(path.as_str(), Arc::new(FileProvider::new(path)), pool.clone());

    let observers: Vec<Arc<ImageObserver>> = (0..consumers.max(1))
        .map(|_| Arc::new(ImageObserver::new()))
        .collect();
    for observer in &observers {
        let consumer: ConsumerRef = observer.clone();
        source.register(&consumer, CallerContext::Trusted, true)?;
    }

    for (i, observer) in observers.iter().enumerate() {
        match observer.done().await {
            Ok(status) => {
                let (width, height) = status.dimensions.unwrap_or((0, 0));
                println!(
                    "[consumer {}] {}x{} frames={} blocks={}",
                    i, width, height, status.frames, status.pixel_blocks
                );
            }
            Err(WaitError::Failed(failure)) => {
                println!("[consumer {}] failed: {} (discard={})", i, failure, failure.discard);
            }
            Err(e) => println!("[consumer {}] {}", i, e),
        }
    }

    let stats = source.stats();
    println!(
        "Source: passes={} completed={} failed={} events={} bytes={}",
        stats.passes_started,
        stats.passes_completed,
        stats.passes_failed,
        stats.events_delivered,
        stats.bytes_read
    );
    let pool_stats = pool.stats();
    println!(
        "Pool: workers={} scheduled={} completed={}",
        pool_stats.workers, pool_stats.scheduled, pool_stats.completed
    );

    pool.shutdown();
    Ok(())
}

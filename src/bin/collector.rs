//! LSM303D Report Collector
//!
//! Samples the part in the background and writes every drained report to an
//! HDF5 file.
//!
//! Usage:
//!   collector --output reports.h5 --rate 500 --queue-depth 32 --duration 60

use clap::Parser;
use lsm303d_sampler::{
    open_backend, Backend, DriverConfig, Lsm303d, Lsm303dError, PollRate, ReportReader, ReportWriter,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Collect LSM303D reports to an HDF5 file", long_about = None)]
struct Args {
    /// Output HDF5 file path
    #[arg(short, long, default_value = "lsm303d_reports.h5")]
    output: PathBuf,

    /// Bus backend: "sim" or "ftdi"
    #[arg(long, default_value_t = Backend::Sim)]
    backend: Backend,

    /// MPSSE channel index for the ftdi backend
    #[arg(long, default_value_t = 0)]
    channel: u32,

    /// Poll rate in Hz (1-1000)
    #[arg(short, long, default_value_t = 250, value_parser = clap::value_parser!(u32).range(1..))]
    rate: u32,

    /// Usable report slots between drains
    #[arg(short, long, default_value_t = 32)]
    queue_depth: usize,

    /// Duration in seconds (optional, runs until Ctrl+C if omitted)
    #[arg(short, long)]
    duration: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("LSM303D Report Collector");
    println!("========================");
    println!("Backend: {}", args.backend);
    println!("Poll rate: {} Hz", args.rate);
    println!("Queue depth: {}", args.queue_depth);
    println!("Output file: {}", args.output.display());
    if let Some(duration) = args.duration {
        println!("Duration: {} seconds", duration);
    } else {
        println!("Duration: continuous (Ctrl+C to stop)");
    }
    println!();

    let bus = open_backend(args.backend, args.channel)?;
    let mut sensor = Lsm303d::with_config(
        bus,
        DriverConfig {
            queue_depth: args.queue_depth,
            max_queue_depth: args.queue_depth.max(DriverConfig::default().max_queue_depth),
            ..Default::default()
        },
    )?;

    // Validate the rate before creating the file
    sensor.set_poll_rate(PollRate::Hz(args.rate))?;
    sensor.stop();

    let mut writer = ReportWriter::create(
        &args.output,
        args.rate as f64,
        &sensor.sample_rate().to_string(),
        &sensor.range().to_string(),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping collection...");
        r.store(false, Ordering::SeqCst);
    })?;

    let collection_start = Instant::now();
    let end_time = args.duration.map(|d| collection_start + Duration::from_secs(d));
    let ready = sensor.data_ready();
    let mut seen = ready.generation();
    let mut last_flush = Instant::now();

    sensor.start()?;
    println!("Collecting... Press Ctrl+C to stop\n");

    let result = loop {
        if !running.load(Ordering::SeqCst) || end_time.is_some_and(|end| Instant::now() >= end) {
            break Ok(());
        }

        match sensor.read(args.queue_depth) {
            Ok(reports) => {
                if let Err(e) = writer.append_batch(&reports) {
                    break Err(e);
                }
            }
            Err(e) if e.is_would_block() => {
                seen = ready.wait_timeout(seen, Duration::from_millis(100)).0;
                continue;
            }
            Err(e) => break Err(e),
        }

        // Periodic flush (every 10 seconds)
        if last_flush.elapsed() >= Duration::from_secs(10) {
            if let Err(e) = writer.flush() {
                eprintln!("Flush error: {}", e);
            }
            last_flush = Instant::now();
        }
    };

    // Pick up what is still queued before the ring goes away
    let result = result.and_then(|()| match sensor.read(args.queue_depth) {
        Ok(reports) => writer.append_batch(&reports),
        Err(e) if e.is_would_block() => Ok(()),
        Err(e) => Err(e),
    });
    sensor.stop();
    let diagnostics = sensor.diagnostics();

    match result {
        Ok(()) => {
            let written = writer.finish()?;
            let elapsed = collection_start.elapsed().as_secs_f64();

            // Read the file back so a truncated write shows up here
            let reader = ReportReader::open(&args.output)?;
            let stored = reader.total_reports();
            if stored != written {
                return Err(Box::new(Lsm303dError::Storage(format!(
                    "wrote {} reports but the file holds {}",
                    written, stored
                ))));
            }

            println!("\nCollection complete!");
            println!("Total reports: {}", stored);
            println!("Elapsed time: {:.2} seconds", elapsed);
            println!("Actual report rate: {:.1} Hz", stored as f64 / elapsed);
            println!("Dropped (overrun): {}", diagnostics.overruns);
            if let Some(last) = reader.read_range(stored.saturating_sub(1), 1)?.first() {
                println!("Last report: t={}us raw={:?}", last.timestamp_us, last.raw());
            }
            println!("File: {}", args.output.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("\nError during collection: {}", e);
            eprintln!("Attempting to flush data...");
            if let Err(flush_err) = writer.flush() {
                eprintln!("Failed to flush: {}", flush_err);
            }
            Err(Box::new(e))
        }
    }
}

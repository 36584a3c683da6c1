//! LSM303D command-line front end
//!
//! Opens the part on the selected backend and runs one of the driver's
//! service commands: a self test, a diagnostics dump, a live display, or a
//! reset request.

use clap::{Args, Parser, Subcommand};
use lsm303d_sampler::{
    create_bar, open_backend, Backend, BusTransport, DriverConfig, Lsm303d, Lsm303dError, PollRate,
    Report,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Driver = Lsm303d<Box<dyn BusTransport + Send>>;

#[derive(Parser, Debug)]
#[command(name = "lsm303d")]
#[command(about = "LSM303D accelerometer sampling driver", long_about = None)]
struct Cli {
    #[command(flatten)]
    device: DeviceArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Bus backend: "sim" or "ftdi"
    #[arg(long, default_value_t = Backend::Sim, global = true)]
    backend: Backend,

    /// MPSSE channel index for the ftdi backend
    #[arg(long, default_value_t = 0, global = true)]
    channel: u32,

    /// Usable report slots
    #[arg(long, default_value_t = 1, global = true)]
    queue_depth: usize,

    /// Largest acceleration to measure, in g (0 = widest range)
    #[arg(long, global = true)]
    range: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One manual read, then one read in automatic mode
    Test,
    /// Sample for a while and print ring and timing diagnostics
    Info {
        /// Poll rate: manual, default, max or a rate in Hz
        #[arg(short, long, default_value = "default")]
        rate: PollRate,

        /// Seconds to sample before printing
        #[arg(short, long, default_value_t = 1)]
        seconds: u64,
    },
    /// Live console display of calibrated acceleration
    Watch {
        /// Poll rate: manual, default, max or a rate in Hz
        #[arg(short, long, default_value = "default")]
        rate: PollRate,
    },
    /// Request a device reset, then resume at the default rate
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut sensor = match open(&cli.device) {
        Ok(sensor) => sensor,
        Err(Lsm303dError::NoChannelsFound) => {
            eprintln!("Error: No FT232H devices found.");
            eprintln!("Please check:");
            eprintln!("  1. FT232H is connected via USB");
            eprintln!("  2. FTDI drivers are installed");
            eprintln!("  3. No other application is using the device");
            return Err(Box::new(Lsm303dError::NoChannelsFound));
        }
        Err(Lsm303dError::InvalidDeviceId(id)) => {
            eprintln!("Error: WHO_AM_I returned 0x{:02X}, not an LSM303D", id);
            eprintln!("Please check:");
            eprintln!("  1. LSM303D is wired to the FT232H SPI pins (CS on D3)");
            eprintln!("  2. Power supply to the LSM303D is correct (3.3V)");
            eprintln!("  3. SDO/SDI are not swapped");
            return Err(Box::new(Lsm303dError::InvalidDeviceId(id)));
        }
        Err(e) => {
            eprintln!("Error initializing sensor: {}", e);
            return Err(Box::new(e));
        }
    };

    match cli.command {
        Command::Test => test(&mut sensor)?,
        Command::Info { rate, seconds } => info(&mut sensor, rate, seconds)?,
        Command::Watch { rate } => watch(&mut sensor, rate)?,
        Command::Reset => reset(&mut sensor)?,
    }

    Ok(())
}

fn open(args: &DeviceArgs) -> lsm303d_sampler::Result<Driver> {
    let bus = open_backend(args.backend, args.channel)?;
    let config = DriverConfig {
        queue_depth: args.queue_depth,
        ..Default::default()
    };

    let mut sensor = Lsm303d::with_config(bus, config)?;
    if let Some(max_g) = args.range {
        sensor.set_range(max_g)?;
    }
    Ok(sensor)
}

fn print_report(label: &str, report: &Report) {
    println!("{}:", label);
    println!("  time:   {} us", report.timestamp_us);
    println!(
        "  raw:    x={} y={} z={}",
        report.x_raw, report.y_raw, report.z_raw
    );
    match report.physical {
        Some(p) => {
            println!("  accel:  x={:.4} y={:.4} z={:.4} m/s^2", p.x, p.y, p.z);
            println!("  range:  {:.4} m/s^2 ({:.6} m/s^2/LSB)", p.range_m_s2, p.scaling);
        }
        None => println!("  accel:  (uncalibrated)"),
    }
}

/// Wait for the first report in automatic mode
fn read_blocking(sensor: &Driver, timeout: Duration) -> lsm303d_sampler::Result<Vec<Report>> {
    let ready = sensor.data_ready();
    let deadline = Instant::now() + timeout;
    let mut seen = ready.generation();

    loop {
        match sensor.read(sensor.queue_depth()) {
            Err(e) if e.is_would_block() => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Lsm303dError::CommunicationError(
                        "timed out waiting for data".into(),
                    ));
                }
                seen = ready.wait_timeout(seen, deadline - now).0;
            }
            other => return other,
        }
    }
}

fn test(sensor: &mut Driver) -> lsm303d_sampler::Result<()> {
    sensor.set_poll_rate(PollRate::Manual)?;
    let report = sensor.read(1)?[0];
    print_report("single read", &report);

    sensor.set_poll_rate(PollRate::Default)?;
    let reports = read_blocking(sensor, Duration::from_secs(2))?;
    print_report("periodic read", &reports[reports.len() - 1]);

    sensor.stop();
    println!("PASS");
    Ok(())
}

fn info(sensor: &mut Driver, rate: PollRate, seconds: u64) -> lsm303d_sampler::Result<()> {
    sensor.set_poll_rate(rate)?;
    thread::sleep(Duration::from_secs(seconds));
    println!("{}", sensor.diagnostics());
    Ok(())
}

fn reset(sensor: &mut Driver) -> lsm303d_sampler::Result<()> {
    match sensor.reset() {
        Err(Lsm303dError::Unsupported(what)) => println!("{} is not implemented for this part", what),
        other => other?,
    }
    sensor.set_poll_rate(PollRate::Default)?;
    println!("sampling at {}", sensor.poll_rate());
    Ok(())
}

fn watch(sensor: &mut Driver, rate: PollRate) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    sensor.set_poll_rate(rate)?;
    let full_scale = sensor.range().range_m_s2();
    let started_at = chrono::Local::now();
    let start_time = Instant::now();
    let mut report_count = 0u64;

    // Clear screen once at start
    print!("\x1B[2J\x1B[H");
    io::stdout().flush()?;

    while running.load(Ordering::SeqCst) {
        let reports = if sensor.is_running() {
            match read_blocking(sensor, Duration::from_millis(500)) {
                Ok(reports) => reports,
                Err(e) => {
                    eprintln!("\nError reading sensor: {}", e);
                    thread::sleep(Duration::from_millis(500));
                    continue;
                }
            }
        } else {
            thread::sleep(Duration::from_millis(20));
            sensor.read(1)?
        };
        report_count += reports.len() as u64;

        let Some(latest) = reports.last() else {
            continue;
        };
        let (x, y, z) = latest.accel_m_s2().unwrap_or((0.0, 0.0, 0.0));
        let elapsed = start_time.elapsed().as_secs_f64();
        let report_rate = if elapsed > 0.0 {
            report_count as f64 / elapsed
        } else {
            0.0
        };

        // Move cursor to top without clearing (reduces flicker)
        print!("\x1B[H");
        println!("LSM303D - Live Data (since {})        ", started_at.format("%H:%M:%S"));
        println!("==========================================                 ");
        println!(
            "Time: {:.2}s | Reports: {} | Rate: {:.1} Hz | Poll: {}          ",
            elapsed,
            report_count,
            report_rate,
            sensor.poll_rate()
        );
        println!();
        println!("ACCELEROMETER (m/s^2)        {}", sensor.range());
        println!("  X: {:8.3}  [{}]", x, create_bar(x, full_scale, 40));
        println!("  Y: {:8.3}  [{}]", y, create_bar(y, full_scale, 40));
        println!("  Z: {:8.3}  [{}]", z, create_bar(z, full_scale, 40));
        println!();
        println!("Press Ctrl+C to exit                                           ");
        io::stdout().flush()?;
    }

    sensor.stop();
    println!("\n{}", sensor.diagnostics());
    Ok(())
}

//! Compare manual reads with timer-driven polling
//!
//! Manual mode measures on every read; polling mode drains whatever the
//! timer queued since the last read.

use lsm303d_sampler::{Lsm303d, PollRate, SimulatedLsm303d};
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("LSM303D Manual vs Polling");
    println!("=========================\n");

    let mut sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;
    sensor.set_queue_depth(16)?;

    println!("1. Manual reads:");
    sensor.set_poll_rate(PollRate::Manual)?;
    for i in 0..5 {
        let report = sensor.read(16)?[0];
        let (x, y, z) = report.accel_m_s2().unwrap_or_default();
        println!("   Read {}: 1 report  t={}us  x={:.3} y={:.3} z={:.3} m/s^2",
                 i + 1, report.timestamp_us, x, y, z);
        thread::sleep(Duration::from_millis(20));
    }

    println!("\n2. Polling at 250 Hz:");
    sensor.set_poll_rate(PollRate::Default)?;
    for i in 0..5 {
        thread::sleep(Duration::from_millis(20));
        match sensor.read(16) {
            Ok(reports) => println!("   Read {}: {} reports", i + 1, reports.len()),
            Err(e) if e.is_would_block() => println!("   Read {}: nothing queued yet", i + 1),
            Err(e) => return Err(e.into()),
        }
    }

    sensor.stop();
    println!("\n{}", sensor.diagnostics());
    Ok(())
}

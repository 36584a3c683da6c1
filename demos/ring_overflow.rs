//! Show the overwrite-oldest policy of the report ring
//!
//! Samples faster than it reads, then prints which reports survived and how
//! many were dropped.

use lsm303d_sampler::{Lsm303d, PollRate, SimulatedLsm303d};
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("LSM303D Report Ring Overflow");
    println!("============================\n");

    let mut sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;

    for depth in [2usize, 8, 32] {
        sensor.set_queue_depth(depth)?;
        sensor.set_poll_rate(PollRate::Hz(1000))?;

        // ~100 ticks land while we are away
        thread::sleep(Duration::from_millis(100));
        let reports = sensor.read(depth)?;
        let diagnostics = sensor.diagnostics();
        sensor.stop();

        let first = reports.first().map_or(0, |r| r.timestamp_us);
        let last = reports.last().map_or(0, |r| r.timestamp_us);
        println!("depth {:>2}: kept {:>2} reports spanning {:>6} us, {:>3} dropped",
                 depth, reports.len(), last - first, diagnostics.overruns);
    }

    println!("\nOnly the newest depth reports survive a slow consumer.");
    Ok(())
}

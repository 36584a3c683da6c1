//! Host-side sampling driver for the ST LSM303D accelerometer
//!
//! The part sits on an SPI bus reached through a [`BusTransport`]: an FT232H
//! via libMPSSE (feature `ftdi`) or the in-process [`SimulatedLsm303d`]. A
//! host timer samples it at a configurable rate into a bounded report ring
//! that drops the oldest report when the consumer falls behind.
//!
//! # Quick Start
//!
//! ## Single Reads
//! ```no_run
//! use lsm303d_sampler::{Lsm303d, SimulatedLsm303d};
//!
//! // Sampling starts stopped, so every read measures once
//! let sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;
//! let report = sensor.read(1)?[0];
//!
//! if let Some((x, y, z)) = report.accel_m_s2() {
//!     println!("{:.2} {:.2} {:.2} m/s^2", x, y, z);
//! }
//! # Ok::<(), lsm303d_sampler::Lsm303dError>(())
//! ```
//!
//! ## Background Sampling
//! ```no_run
//! use lsm303d_sampler::{Lsm303d, PollRate, SimulatedLsm303d};
//! use std::time::Duration;
//!
//! let mut sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;
//! sensor.set_queue_depth(16)?;
//! sensor.set_poll_rate(PollRate::Hz(500))?;
//!
//! std::thread::sleep(Duration::from_millis(20));
//! match sensor.read(16) {
//!     Ok(reports) => println!("{} reports", reports.len()),
//!     Err(e) if e.is_would_block() => println!("nothing yet"),
//!     Err(e) => return Err(e),
//! }
//!
//! println!("{}", sensor.diagnostics());
//! # Ok::<(), lsm303d_sampler::Lsm303dError>(())
//! ```
//!
//! ## Forwarding Reports
//! ```no_run
//! use lsm303d_sampler::{DriverConfig, Lsm303d, PollRate, SimulatedLsm303d, ThreadTimer, TimeKeeper};
//! use std::sync::{mpsc, Arc};
//!
//! let (tx, rx) = mpsc::channel();
//! let mut sensor = Lsm303d::with_parts(
//!     SimulatedLsm303d::with_waveform(),
//!     ThreadTimer::default(),
//!     Arc::new(TimeKeeper::new()),
//!     Box::new(tx),
//!     DriverConfig::default(),
//! )?;
//! sensor.set_poll_rate(PollRate::Default)?;
//!
//! for report in rx.iter().take(250) {
//!     println!("{} {:?}", report.timestamp_us, report.raw());
//! }
//! # Ok::<(), lsm303d_sampler::Lsm303dError>(())
//! ```

pub mod calibration;
pub mod common;
pub mod config;
pub mod error;
#[cfg(feature = "ftdi")]
mod ffi;
#[cfg(feature = "hdf5")]
pub mod hdf5_format;
pub mod identity;
pub mod lsm303d;
pub mod perf;
pub mod protocol;
pub mod registers;
pub mod report;
pub mod ring;
pub mod scheduler;
pub mod signal;
pub mod sim;
pub mod timer;
pub mod transport;

// Re-export public API
pub use calibration::{CalibrationPolicy, LinearCalibration};
pub use common::{create_bar, MonotonicClock, TimeKeeper};
pub use config::DriverConfig;
pub use error::{Lsm303dError, Result};
#[cfg(feature = "hdf5")]
pub use hdf5_format::{Metadata, ReportReader, ReportWriter};
pub use lsm303d::{DiagnosticSnapshot, Lsm303d, PollRate};
pub use perf::{PerfCounter, PerfSnapshot};
pub use protocol::RegisterProtocol;
pub use registers::{AccelRange, OutputDataRate};
pub use report::{CalibrationScale, PhysicalAxes, RawSample, Report};
pub use ring::ReportRing;
pub use scheduler::SamplingScheduler;
pub use signal::{DataReady, NullSink, ReportSink};
pub use sim::{ManualClock, ManualTimer, SimulatedLsm303d};
pub use timer::{HostTimer, ThreadTimer, TickFn};
pub use transport::{open_backend, Backend, BusTransport};
#[cfg(feature = "ftdi")]
pub use transport::MpsseSpi;

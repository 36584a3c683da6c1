//! LSM303D accelerometer driver: periodic sampling into a report ring
//!
//! A host timer tick runs the measurement step (one burst read of STATUS_A
//! and the three axes), stamps and calibrates the sample, pushes it into the
//! ring, wakes waiters and hands it to the report sink. Consumers drain the
//! ring with [`Lsm303d::read`]. With sampling stopped, `read` measures once
//! on the spot instead.

use crate::calibration::{CalibrationPolicy, LinearCalibration};
use crate::common::{MonotonicClock, TimeKeeper};
use crate::config::DriverConfig;
use crate::error::{Lsm303dError, Result};
use crate::identity;
use crate::perf::{PerfCounter, PerfSnapshot};
use crate::protocol::RegisterProtocol;
use crate::registers::*;
use crate::report::{CalibrationScale, RawSample, Report};
use crate::ring::ReportRing;
use crate::scheduler::SamplingScheduler;
use crate::signal::{DataReady, NullSink, ReportSink};
use crate::timer::{HostTimer, ThreadTimer};
use crate::transport::BusTransport;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Requested polling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollRate {
    /// No background sampling; each read measures once
    Manual,
    /// The configured default rate
    Default,
    /// The fastest rate the interval floor allows
    Max,
    /// Sampling paced by an external signal (not supported)
    External,
    /// Fixed rate in Hz; 0 is the same as `Manual`
    Hz(u32),
}

impl fmt::Display for PollRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollRate::Manual => write!(f, "manual"),
            PollRate::Default => write!(f, "default"),
            PollRate::Max => write!(f, "max"),
            PollRate::External => write!(f, "external"),
            PollRate::Hz(hz) => write!(f, "{} Hz", hz),
        }
    }
}

impl FromStr for PollRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(PollRate::Manual),
            "default" => Ok(PollRate::Default),
            "max" => Ok(PollRate::Max),
            "external" => Ok(PollRate::External),
            other => other
                .trim_end_matches("Hz")
                .trim()
                .parse::<u32>()
                .map(PollRate::Hz)
                .map_err(|_| {
                    format!(
                        "invalid poll rate '{}', expected manual, default, max or a rate in Hz",
                        other
                    )
                }),
        }
    }
}

/// Ring, scheduler and timing state at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticSnapshot {
    /// Ring slots including the sentinel
    pub capacity: usize,
    pub unread: usize,
    pub read_cursor: usize,
    pub write_cursor: usize,
    /// Reports dropped because the consumer fell behind
    pub overruns: u64,
    pub poll_rate: PollRate,
    pub output_data_rate: OutputDataRate,
    pub range: AccelRange,
    pub perf: PerfSnapshot,
}

impl fmt::Display for DiagnosticSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.perf)?;
        writeln!(
            f,
            "report queue:   {} ({}/{})",
            self.capacity, self.read_cursor, self.write_cursor
        )?;
        writeln!(f, "unread:         {} ({} overruns)", self.unread, self.overruns)?;
        write!(
            f,
            "poll rate:      {} (ODR {}, range {})",
            self.poll_rate, self.output_data_rate, self.range
        )
    }
}

struct CalibrationState {
    policy: Option<Arc<dyn CalibrationPolicy>>,
    scale: CalibrationScale,
    range: AccelRange,
}

/// Everything the timer tick touches
struct Sampler<B> {
    protocol: Mutex<RegisterProtocol<B>>,
    clock: Arc<dyn MonotonicClock>,
    calibration: RwLock<CalibrationState>,
    sink: Box<dyn ReportSink>,
    data_ready: Arc<DataReady>,
    perf: PerfCounter,
    warned: AtomicBool,
}

impl<B: BusTransport> Sampler<B> {
    fn protocol(&self) -> Result<MutexGuard<'_, RegisterProtocol<B>>> {
        self.protocol
            .lock()
            .map_err(|_| Lsm303dError::CommunicationError("bus lock poisoned".into()))
    }

    /// One measurement: burst read, decode, timestamp, calibrate
    fn measure(&self) -> Result<Report> {
        let started = Instant::now();

        let mut frame = [0u8; SAMPLE_BURST_LEN];
        self.protocol()?.read_burst(ADDR_STATUS_A, &mut frame)?;
        let sample = RawSample::from_burst(&frame);
        let timestamp_us = self.clock.now_us();

        let physical = {
            let calibration = self.calibration.read().unwrap_or_else(PoisonError::into_inner);
            calibration
                .policy
                .as_ref()
                .map(|policy| policy.apply(sample.axes(), calibration.range, &calibration.scale))
        };

        self.perf.record(started.elapsed());
        Ok(Report {
            timestamp_us,
            x_raw: sample.x,
            y_raw: sample.y,
            z_raw: sample.z,
            physical,
        })
    }

    /// Timer callback body; failures are counted, never retried
    fn tick(&self, ring: &ReportRing) {
        match self.measure() {
            Ok(report) => {
                ring.push(&report);
                self.data_ready.notify();
                self.sink.publish(&report);
            }
            Err(e) => self.note_failure(&e),
        }
    }

    fn note_failure(&self, error: &Lsm303dError) {
        let failures = self.perf.record_error();
        if !self.warned.swap(true, Ordering::Relaxed) {
            log::warn!("measurement failed: {}", error);
        } else {
            log::debug!("measurement failed ({} so far): {}", failures, error);
        }
    }
}

/// Ring holding `depth` unread reports plus the sentinel slot
fn ring_for(depth: usize) -> Result<ReportRing> {
    let capacity = depth.checked_add(1).ok_or_else(|| {
        Lsm303dError::InvalidParameter(format!("queue depth {} has no room for a sentinel", depth))
    })?;
    ReportRing::with_capacity(capacity)
}

/// LSM303D accelerometer with timer-driven sampling
pub struct Lsm303d<B, T: HostTimer = ThreadTimer> {
    sampler: Arc<Sampler<B>>,
    ring: Arc<ReportRing>,
    scheduler: SamplingScheduler<T>,
    config: DriverConfig,
    output_data_rate: OutputDataRate,
}

impl<B> Lsm303d<B, ThreadTimer>
where
    B: BusTransport + Send + 'static,
{
    /// Probe and initialize the part with the default configuration
    ///
    /// # Arguments
    /// * `bus` - Transport the part is attached to
    ///
    /// # Returns
    /// * `Ok(Lsm303d)` - Initialized driver in manual mode
    /// * `Err(Lsm303dError)` - If the probe or the register setup fails
    ///
    /// # Example
    /// ```no_run
    /// use lsm303d_sampler::{Lsm303d, SimulatedLsm303d};
    ///
    /// let sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;
    /// let report = sensor.read(1)?[0];
    /// println!("raw: {:?}", report.raw());
    /// # Ok::<(), lsm303d_sampler::Lsm303dError>(())
    /// ```
    pub fn new(bus: B) -> Result<Self> {
        Self::with_config(bus, DriverConfig::default())
    }

    pub fn with_config(bus: B, config: DriverConfig) -> Result<Self> {
        Self::with_parts(
            bus,
            ThreadTimer::default(),
            Arc::new(TimeKeeper::new()),
            Box::new(NullSink),
            config,
        )
    }
}

impl<B, T> Lsm303d<B, T>
where
    B: BusTransport + Send + 'static,
    T: HostTimer,
{
    /// Probe and initialize with every collaborator supplied by the caller
    ///
    /// Verifies WHO_AM_I, allocates a ring of `queue_depth + 1` slots, then
    /// writes CTRL_REG1 (rate, block data update, X/Y/Z enable) and CTRL_REG2
    /// (full scale). Sampling starts stopped.
    ///
    /// # Arguments
    /// * `bus` - Transport the part is attached to
    /// * `timer` - Periodic callback facility driving the ticks
    /// * `clock` - Timestamp source
    /// * `sink` - Receives every measured report
    /// * `config` - Ring sizes, rate limits and initial register values
    pub fn with_parts(
        bus: B,
        timer: T,
        clock: Arc<dyn MonotonicClock>,
        sink: Box<dyn ReportSink>,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut protocol = RegisterProtocol::new(bus);
        identity::verify(&mut protocol)?;

        let ring = ring_for(config.queue_depth)?;

        protocol.write_register(
            ADDR_CTRL_REG1,
            config.output_data_rate.bits() | REG1_BDU | REG1_XYZ_ENABLE_A,
        )?;
        protocol.write_register(ADDR_CTRL_REG2, config.range.bits())?;

        log::info!(
            "LSM303D ready: ODR {}, range {}, queue depth {}",
            config.output_data_rate,
            config.range,
            config.queue_depth
        );

        let calibration = CalibrationState {
            policy: config
                .calibrate
                .then(|| Arc::new(LinearCalibration) as Arc<dyn CalibrationPolicy>),
            scale: CalibrationScale::default(),
            range: config.range,
        };

        let sampler = Sampler {
            protocol: Mutex::new(protocol),
            clock,
            calibration: RwLock::new(calibration),
            sink,
            data_ready: Arc::new(DataReady::new()),
            perf: PerfCounter::new("lsm303d_read"),
            warned: AtomicBool::new(false),
        };

        Ok(Self {
            sampler: Arc::new(sampler),
            ring: Arc::new(ring),
            scheduler: SamplingScheduler::new(timer),
            output_data_rate: config.output_data_rate,
            config,
        })
    }

    /// Change how often the part is sampled
    ///
    /// Any numeric rate (or `Default`/`Max`) restarts sampling from an empty
    /// ring. When configured to follow the poll rate, the output data rate is
    /// raised first if it is slower than the requested rate.
    ///
    /// # Returns
    /// * `Err(InvalidParameter)` - Interval below the floor; nothing changes
    /// * `Err(Unsupported)` - `PollRate::External`
    pub fn set_poll_rate(&mut self, rate: PollRate) -> Result<()> {
        match rate {
            PollRate::Manual | PollRate::Hz(0) => {
                self.scheduler.set_manual();
                log::info!("poll rate: manual");
                Ok(())
            }
            PollRate::External => Err(Lsm303dError::Unsupported("external poll signalling")),
            PollRate::Default => self.poll_at(self.config.default_poll_hz),
            PollRate::Max => self.poll_at(self.config.max_poll_hz()),
            PollRate::Hz(hz) => self.poll_at(hz),
        }
    }

    /// `Manual` while stopped, otherwise the running rate in Hz
    pub fn poll_rate(&self) -> PollRate {
        match self.scheduler.interval_us() {
            _ if !self.scheduler.is_running() => PollRate::Manual,
            0 => PollRate::Manual,
            interval_us => PollRate::Hz((1_000_000 / interval_us) as u32),
        }
    }

    fn poll_at(&mut self, hz: u32) -> Result<()> {
        let interval_us = 1_000_000 / hz as u64;
        if interval_us < self.config.min_interval_us {
            return Err(Lsm303dError::InvalidParameter(format!(
                "poll rate {} Hz is faster than the {} us interval floor",
                hz, self.config.min_interval_us
            )));
        }

        let previous_rate = self.output_data_rate;
        if self.config.follow_poll_rate && previous_rate.millihertz() < hz as u64 * 1000 {
            let rate = OutputDataRate::at_least(hz).ok_or_else(|| {
                Lsm303dError::InvalidParameter(format!("no output data rate reaches {} Hz", hz))
            })?;
            self.apply_output_data_rate(rate)?;
        }

        if let Err(e) = self.restart(interval_us) {
            if self.output_data_rate != previous_rate {
                if let Err(restore) = self.apply_output_data_rate(previous_rate) {
                    log::warn!("could not restore output data rate {}: {}", previous_rate, restore);
                }
            }
            return Err(e);
        }
        log::info!("poll rate: {} Hz ({} us)", hz, interval_us);
        Ok(())
    }

    /// Stop, empty the ring, start again at `interval_us`
    fn restart(&mut self, interval_us: u64) -> Result<()> {
        self.scheduler.stop();
        self.ring.reset();
        self.sampler.warned.store(false, Ordering::Relaxed);

        let sampler = Arc::clone(&self.sampler);
        let ring = Arc::clone(&self.ring);
        self.scheduler
            .start(interval_us, Box::new(move || sampler.tick(&ring)))
    }

    /// Resume sampling at the last rate, or the default rate if none was set
    pub fn start(&mut self) -> Result<()> {
        match self.scheduler.interval_us() {
            0 => self.poll_at(self.config.default_poll_hz),
            interval_us => self.restart(interval_us),
        }
    }

    /// Stop sampling; the last rate is remembered for [`start`](Self::start)
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Resize the ring to hold `depth` unread reports
    ///
    /// The new ring is allocated before anything else changes, so a failed
    /// allocation leaves the old ring and its contents in place. Unread
    /// reports are discarded on success; sampling resumes if it was running.
    ///
    /// # Returns
    /// * `Err(InvalidParameter)` - `depth` outside `1..=max_queue_depth`
    /// * `Err(OutOfMemory)` - the new ring could not be allocated
    pub fn set_queue_depth(&mut self, depth: usize) -> Result<()> {
        if depth < 1 || depth > self.config.max_queue_depth {
            return Err(Lsm303dError::InvalidParameter(format!(
                "queue depth {} outside 1..={}",
                depth, self.config.max_queue_depth
            )));
        }

        let ring = Arc::new(ring_for(depth)?);

        let was_running = self.scheduler.is_running();
        self.scheduler.stop();
        self.ring = ring;
        if was_running {
            self.restart(self.scheduler.interval_us())?;
        }

        log::info!("queue depth: {}", depth);
        Ok(())
    }

    /// Unread reports the ring can hold
    pub fn queue_depth(&self) -> usize {
        self.ring.usable()
    }

    /// Fetch up to `max` reports
    ///
    /// While sampling runs this drains the ring oldest-first without
    /// blocking. With sampling stopped it performs one measurement right away,
    /// publishes it and returns it without touching the ring.
    ///
    /// # Returns
    /// * `Ok(reports)` - At least one report
    /// * `Err(WouldBlock)` - Sampling is running but nothing is unread yet
    /// * `Err(InvalidParameter)` - `max` is zero
    ///
    /// # Example
    /// ```no_run
    /// use lsm303d_sampler::{Lsm303d, PollRate, SimulatedLsm303d};
    /// use std::time::Duration;
    ///
    /// let mut sensor = Lsm303d::new(SimulatedLsm303d::with_waveform())?;
    /// sensor.set_poll_rate(PollRate::Hz(200))?;
    ///
    /// let ready = sensor.data_ready();
    /// let mut seen = ready.generation();
    /// loop {
    ///     match sensor.read(16) {
    ///         Ok(reports) => {
    ///             for report in &reports {
    ///                 println!("{} {:?}", report.timestamp_us, report.accel_m_s2());
    ///             }
    ///             break;
    ///         }
    ///         Err(e) if e.is_would_block() => {
    ///             seen = ready.wait_timeout(seen, Duration::from_millis(50)).0;
    ///         }
    ///         Err(e) => return Err(e),
    ///     }
    /// }
    /// # Ok::<(), lsm303d_sampler::Lsm303dError>(())
    /// ```
    pub fn read(&self, max: usize) -> Result<Vec<Report>> {
        if max == 0 {
            return Err(Lsm303dError::InvalidParameter(
                "read needs room for at least one report".into(),
            ));
        }

        if self.scheduler.is_running() {
            let reports = self.ring.drain(max);
            if reports.is_empty() {
                return Err(Lsm303dError::WouldBlock);
            }
            return Ok(reports);
        }

        match self.sampler.measure() {
            Ok(report) => {
                self.sampler.sink.publish(&report);
                Ok(vec![report])
            }
            Err(e) => {
                self.sampler.perf.record_error();
                Err(e)
            }
        }
    }

    /// Device reset is not implemented
    pub fn reset(&mut self) -> Result<()> {
        Err(Lsm303dError::Unsupported("reset"))
    }

    /// Select the smallest full scale covering `max_g` (0 selects the largest)
    ///
    /// Calibrated values use the new sensitivity from the next measurement.
    pub fn set_range(&mut self, max_g: u32) -> Result<AccelRange> {
        let range = AccelRange::covering(max_g).ok_or_else(|| {
            Lsm303dError::InvalidParameter(format!("no range covers +/-{}g", max_g))
        })?;

        self.sampler
            .protocol()?
            .modify_register(ADDR_CTRL_REG2, REG2_FULL_SCALE_MASK, range.bits())?;
        self.sampler
            .calibration
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .range = range;

        log::info!("range: {}", range);
        Ok(range)
    }

    pub fn range(&self) -> AccelRange {
        self.sampler
            .calibration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range
    }

    /// Select the slowest output data rate of at least `hz` (0 selects the fastest)
    pub fn set_sample_rate(&mut self, hz: u32) -> Result<OutputDataRate> {
        let rate = OutputDataRate::at_least(hz).ok_or_else(|| {
            Lsm303dError::InvalidParameter(format!("no output data rate reaches {} Hz", hz))
        })?;
        self.apply_output_data_rate(rate)?;
        Ok(rate)
    }

    pub fn sample_rate(&self) -> OutputDataRate {
        self.output_data_rate
    }

    fn apply_output_data_rate(&mut self, rate: OutputDataRate) -> Result<()> {
        self.sampler
            .protocol()?
            .modify_register(ADDR_CTRL_REG1, REG1_RATE_MASK, rate.bits())?;
        self.output_data_rate = rate;
        log::info!("output data rate: {}", rate);
        Ok(())
    }

    /// Store new per-axis offsets and scales
    pub fn set_calibration(&self, scale: CalibrationScale) {
        self.sampler
            .calibration
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scale = scale;
    }

    pub fn calibration(&self) -> CalibrationScale {
        self.sampler
            .calibration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .scale
    }

    /// Swap the raw-to-SI policy; `None` leaves reports raw-only
    pub fn set_calibration_policy(&self, policy: Option<Arc<dyn CalibrationPolicy>>) {
        self.sampler
            .calibration
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .policy = policy;
    }

    /// Signal raised after each report is queued
    pub fn data_ready(&self) -> Arc<DataReady> {
        Arc::clone(&self.sampler.data_ready)
    }

    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            capacity: self.ring.capacity(),
            unread: self.ring.len(),
            read_cursor: self.ring.read_cursor(),
            write_cursor: self.ring.write_cursor(),
            overruns: self.ring.overruns(),
            poll_rate: self.poll_rate(),
            output_data_rate: self.output_data_rate,
            range: self.range(),
            perf: self.sampler.perf.snapshot(),
        }
    }
}

//! End-to-end sampling behaviour against the simulated part

use lsm303d_sampler::registers::{ADDR_CTRL_REG1, REG1_RATE_MASK};
use lsm303d_sampler::{
    DriverConfig, Lsm303d, Lsm303dError, ManualClock, ManualTimer, NullSink, OutputDataRate,
    PollRate, RegisterProtocol, Report, SimulatedLsm303d, ThreadTimer, TimeKeeper,
};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

struct Rig {
    sim: SimulatedLsm303d,
    timer: ManualTimer,
    clock: Arc<ManualClock>,
    sensor: Lsm303d<SimulatedLsm303d, ManualTimer>,
}

fn rig(queue_depth: usize) -> Rig {
    rig_with(DriverConfig {
        queue_depth,
        ..Default::default()
    })
}

fn rig_with(config: DriverConfig) -> Rig {
    let sim = SimulatedLsm303d::new();
    let timer = ManualTimer::new();
    let clock = Arc::new(ManualClock::new(0));
    let sensor = Lsm303d::with_parts(
        sim.clone(),
        timer.clone(),
        clock.clone(),
        Box::new(NullSink),
        config,
    )
    .unwrap();
    Rig {
        sim,
        timer,
        clock,
        sensor,
    }
}

impl Rig {
    /// One tick producing a report stamped `n` with axes derived from `n`
    fn tick(&self, n: i16) {
        self.sim.push_frame([n, -n, 100 + n]);
        self.clock.set(n as u64 * 1000);
        self.timer.fire(1);
    }
}

fn stamps(reports: &[Report]) -> Vec<u64> {
    reports.iter().map(|r| r.timestamp_us).collect()
}

#[test]
fn test_two_slot_queue_keeps_last_two_of_four() {
    let mut r = rig(2);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();

    for n in 1..=4 {
        r.tick(n);
    }

    let reports = r.sensor.read(10).unwrap();
    assert_eq!(stamps(&reports), vec![3000, 4000]);
    assert_eq!(reports[0].raw(), [3, -3, 103]);
    assert_eq!(reports[1].raw(), [4, -4, 104]);
}

#[test]
fn test_capacity_n_drops_first_of_n() {
    let mut r = rig(4); // 5-slot ring
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    for n in 1..=5 {
        r.tick(n);
    }
    assert_eq!(
        stamps(&r.sensor.read(10).unwrap()),
        vec![2000, 3000, 4000, 5000]
    );
}

#[test]
fn test_drain_is_fifo_across_reads() {
    let mut r = rig(8);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    for n in 1..=5 {
        r.tick(n);
    }
    assert_eq!(stamps(&r.sensor.read(2).unwrap()), vec![1000, 2000]);
    r.tick(6);
    assert_eq!(
        stamps(&r.sensor.read(10).unwrap()),
        vec![3000, 4000, 5000, 6000]
    );
}

#[test]
fn test_empty_ring_would_block_while_running() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    let transactions = r.sim.transactions();

    let err = r.sensor.read(4).unwrap_err();
    assert!(err.is_would_block());
    // Automatic mode never touches the bus from read
    assert_eq!(r.sim.transactions(), transactions);
}

#[test]
fn test_manual_read_measures_exactly_once() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);
    r.sensor.set_poll_rate(PollRate::Manual).unwrap();

    r.sim.push_frame([7, 8, 9]);
    r.sim.push_frame([10, 11, 12]);
    r.clock.set(55_000);
    let transactions = r.sim.transactions();

    let reports = r.sensor.read(10).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].raw(), [7, 8, 9]);
    assert_eq!(reports[0].timestamp_us, 55_000);
    assert_eq!(r.sim.transactions(), transactions + 1);
    assert_eq!(r.sim.pending_frames(), 1);

    // Bypasses the ring entirely
    let diagnostics = r.sensor.diagnostics();
    assert_eq!(diagnostics.unread, 1);
}

#[test]
fn test_rate_above_floor_is_rejected_without_change() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(200)).unwrap();
    r.tick(1);

    let err = r.sensor.set_poll_rate(PollRate::Hz(2000)).unwrap_err();
    assert!(matches!(err, Lsm303dError::InvalidParameter(_)));
    assert_eq!(r.sensor.poll_rate(), PollRate::Hz(200));
    assert_eq!(r.timer.interval(), Some(Duration::from_micros(5000)));
    // Unread report survives the rejected call
    assert_eq!(stamps(&r.sensor.read(4).unwrap()), vec![1000]);
}

#[test]
fn test_rejected_rate_in_manual_mode_stays_manual() {
    let mut r = rig(4);
    assert!(r.sensor.set_poll_rate(PollRate::Hz(1001)).is_err());
    assert_eq!(r.sensor.poll_rate(), PollRate::Manual);
    assert!(!r.timer.is_armed());
}

#[test]
fn test_out_of_bounds_queue_depth_keeps_ring() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);
    r.tick(2);

    for depth in [0, 100, 1000] {
        assert!(matches!(
            r.sensor.set_queue_depth(depth),
            Err(Lsm303dError::InvalidParameter(_))
        ));
    }

    assert_eq!(r.sensor.queue_depth(), 4);
    assert!(r.sensor.is_running());
    assert_eq!(stamps(&r.sensor.read(10).unwrap()), vec![1000, 2000]);
}

#[test]
fn test_queue_depth_resize_discards_and_restarts() {
    let mut r = rig(1);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);

    r.sensor.set_queue_depth(3).unwrap();
    assert_eq!(r.sensor.queue_depth(), 3);
    assert_eq!(r.sensor.diagnostics().capacity, 4);
    assert!(r.sensor.is_running());
    assert!(r.sensor.read(10).unwrap_err().is_would_block());

    for n in 2..=5 {
        r.tick(n);
    }
    assert_eq!(stamps(&r.sensor.read(10).unwrap()), vec![3000, 4000, 5000]);
}

#[test]
fn test_queue_depth_resize_while_stopped_stays_stopped() {
    let mut r = rig(1);
    r.sensor.set_queue_depth(10).unwrap();
    assert!(!r.sensor.is_running());
    assert!(!r.timer.is_armed());
    assert_eq!(r.sensor.queue_depth(), 10);
}

#[test]
fn test_failed_ring_allocation_keeps_old_ring() {
    let mut r = rig_with(DriverConfig {
        queue_depth: 4,
        max_queue_depth: usize::MAX / 2,
        ..Default::default()
    });
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(7);

    assert!(matches!(
        r.sensor.set_queue_depth(usize::MAX / 4),
        Err(Lsm303dError::OutOfMemory { .. })
    ));
    assert_eq!(r.sensor.queue_depth(), 4);
    assert_eq!(r.sensor.diagnostics().capacity, 5);
    assert!(r.sensor.is_running());
    assert_eq!(stamps(&r.sensor.read(10).unwrap()), vec![7000]);
}

#[test]
fn test_queue_depth_without_room_for_sentinel_is_rejected() {
    let mut r = rig_with(DriverConfig {
        queue_depth: 2,
        max_queue_depth: usize::MAX,
        ..Default::default()
    });
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);

    assert!(matches!(
        r.sensor.set_queue_depth(usize::MAX),
        Err(Lsm303dError::InvalidParameter(_))
    ));
    assert_eq!(r.sensor.queue_depth(), 2);
    assert!(r.sensor.is_running());
    assert_eq!(stamps(&r.sensor.read(10).unwrap()), vec![1000]);
}

#[test]
fn test_timer_refusal_restores_output_data_rate() {
    let mut r = rig(4);
    assert_eq!(r.sensor.sample_rate(), OutputDataRate::Hz400);

    r.timer.refuse_next_registration();
    assert!(matches!(
        r.sensor.set_poll_rate(PollRate::Hz(500)),
        Err(Lsm303dError::TimerUnavailable(_))
    ));

    assert_eq!(r.sensor.sample_rate(), OutputDataRate::Hz400);
    assert_eq!(
        r.sim.register(ADDR_CTRL_REG1) & REG1_RATE_MASK,
        OutputDataRate::Hz400.bits()
    );
    assert!(!r.sensor.is_running());

    // The next attempt goes through and raises the rate
    r.sensor.set_poll_rate(PollRate::Hz(500)).unwrap();
    assert_eq!(r.sensor.sample_rate(), OutputDataRate::Hz800);
}

#[test]
fn test_stop_start_resets_cursors() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    for n in 1..=3 {
        r.tick(n);
    }
    r.sensor.read(1).unwrap();

    r.sensor.stop();
    r.sensor.start().unwrap();

    let diagnostics = r.sensor.diagnostics();
    assert_eq!((diagnostics.read_cursor, diagnostics.write_cursor), (0, 0));
    assert_eq!(diagnostics.unread, 0);
    assert_eq!(r.sensor.poll_rate(), PollRate::Hz(100));
    assert!(r.sensor.read(10).unwrap_err().is_would_block());

    r.tick(9);
    assert_eq!(stamps(&r.sensor.read(10).unwrap()), vec![9000]);
}

#[test]
fn test_rate_change_restarts_from_empty_ring() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);
    r.sensor.set_poll_rate(PollRate::Hz(200)).unwrap();
    assert!(r.sensor.read(10).unwrap_err().is_would_block());
}

#[test]
fn test_transport_failure_skips_report() {
    let mut r = rig(4);
    r.sensor.set_poll_rate(PollRate::Hz(100)).unwrap();
    r.tick(1);

    r.sim.fail_next(1);
    r.tick(2);
    let after_failure = r.sensor.diagnostics();
    assert_eq!(after_failure.write_cursor, 1);
    assert_eq!(after_failure.perf.errors, 1);

    // Frame 2 was never latched, so the next tick reads it
    r.tick(3);
    let reports = r.sensor.read(10).unwrap();
    assert_eq!(stamps(&reports), vec![1000, 3000]);
    assert_eq!(reports[1].raw(), [2, -2, 102]);
    assert!(r.sensor.is_running());
}

#[test]
fn test_manual_read_reports_transport_failure() {
    let r = rig(4);
    r.sim.fail_next(1);
    assert!(matches!(
        r.sensor.read(1),
        Err(Lsm303dError::CommunicationError(_))
    ));
    assert_eq!(r.sensor.diagnostics().perf.errors, 1);
}

#[test]
fn test_zero_max_rejected() {
    let r = rig(4);
    assert!(matches!(
        r.sensor.read(0),
        Err(Lsm303dError::InvalidParameter(_))
    ));
}

#[test]
fn test_reset_is_unsupported() {
    let mut r = rig(4);
    assert!(matches!(
        r.sensor.reset(),
        Err(Lsm303dError::Unsupported("reset"))
    ));
}

#[test]
fn test_probe_rejects_no_response_patterns() {
    for id in [0x00u8, 0xFF, 0x48] {
        let sim = SimulatedLsm303d::new();
        sim.set_identity(id);
        let mut protocol = RegisterProtocol::new(sim.clone());
        assert!(!lsm303d_sampler::identity::probe(&mut protocol).unwrap());

        let result = Lsm303d::with_parts(
            sim,
            ManualTimer::new(),
            Arc::new(ManualClock::default()),
            Box::new(NullSink),
            DriverConfig::default(),
        );
        assert!(matches!(result, Err(Lsm303dError::InvalidDeviceId(got)) if got == id));
    }
}

#[test]
fn test_init_after_stale_first_access() {
    let sim = SimulatedLsm303d::new();
    sim.set_stale_first_access(true);
    assert!(Lsm303d::with_parts(
        sim,
        ManualTimer::new(),
        Arc::new(ManualClock::default()),
        Box::new(NullSink),
        DriverConfig::default(),
    )
    .is_ok());
}

#[test]
fn test_thread_timer_samples_in_background() {
    let (tx, rx) = mpsc::channel();
    let mut sensor = Lsm303d::with_parts(
        SimulatedLsm303d::with_waveform(),
        ThreadTimer::default(),
        Arc::new(TimeKeeper::new()),
        Box::new(tx),
        DriverConfig {
            queue_depth: 64,
            ..Default::default()
        },
    )
    .unwrap();

    sensor.set_poll_rate(PollRate::Hz(500)).unwrap();
    let ready = sensor.data_ready();
    let (_, moved) = ready.wait_timeout(0, Duration::from_secs(2));
    assert!(moved, "no tick within 2 s");

    thread::sleep(Duration::from_millis(50));
    let reports = sensor.read(64).unwrap();
    sensor.stop();

    assert!(!reports.is_empty());
    assert!(reports
        .windows(2)
        .all(|pair| pair[0].timestamp_us < pair[1].timestamp_us));
    assert!(reports.iter().all(|r| r.physical.is_some()));

    // Every queued report was also published
    let published: Vec<Report> = rx.try_iter().collect();
    assert!(published.len() >= reports.len());

    // Nothing more arrives once stopped
    let stopped_at = Instant::now();
    let generation = ready.generation();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ready.generation(), generation);
    assert!(stopped_at.elapsed() >= Duration::from_millis(20));
}

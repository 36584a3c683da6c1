//! In-process stand-ins for the hardware and the host timer
//!
//! [`SimulatedLsm303d`] answers SPI frames the way the part does: command
//! byte first, auto-increment when bit 6 is set, WHO_AM_I read-only. Axis
//! data comes from queued frames or from a built-in waveform. Clones share
//! state, so a test can keep one handle while the driver owns another.
//!
//! [`ManualTimer`] is a [`HostTimer`] whose ticks only happen when a test
//! calls [`ManualTimer::fire`], and [`ManualClock`] only advances on request.

use crate::common::MonotonicClock;
use crate::error::{Lsm303dError, Result};
use crate::registers::*;
use crate::timer::{HostTimer, TickFn};
use crate::transport::BusTransport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const REGISTER_COUNT: usize = ADDR_MASK as usize + 1;

struct SimState {
    registers: [u8; REGISTER_COUNT],
    stale_first_access: bool,
    fail_next: u32,
    fail_all: bool,
    frames: VecDeque<[i16; 3]>,
    waveform: bool,
    phase: u64,
    transactions: u64,
}

impl SimState {
    fn new() -> Self {
        let mut registers = [0u8; REGISTER_COUNT];
        registers[ADDR_WHO_AM_I as usize] = WHO_I_AM;
        // Power-on: 0 Hz rate, X/Y/Z enabled
        registers[ADDR_CTRL_REG1 as usize] = REG1_XYZ_ENABLE_A;
        Self {
            registers,
            stale_first_access: false,
            fail_next: 0,
            fail_all: false,
            frames: VecDeque::new(),
            waveform: false,
            phase: 0,
            transactions: 0,
        }
    }

    /// Move the next sample into the output registers, if there is one
    fn latch_sample(&mut self) {
        let axes = match self.frames.pop_front() {
            Some(axes) => axes,
            None if self.waveform => self.waveform_sample(),
            None => {
                self.registers[ADDR_STATUS_A as usize] &= !STATUS_A_ZYXDA;
                return;
            }
        };

        for (i, value) in axes.iter().enumerate() {
            let [low, high] = value.to_le_bytes();
            self.registers[ADDR_OUT_X_L_A as usize + 2 * i] = low;
            self.registers[ADDR_OUT_X_L_A as usize + 2 * i + 1] = high;
        }
        self.registers[ADDR_STATUS_A as usize] |= STATUS_A_ZYXDA;
    }

    /// Slow tilt around 1 g on Z, in counts for the configured range
    fn waveform_sample(&mut self) -> [i16; 3] {
        let counts_per_g = 1000.0 / self.range().sensitivity_mg();
        let angle = self.phase as f32 * 0.05;
        self.phase += 1;
        let g = [0.25 * angle.sin(), 0.25 * angle.cos(), 1.0];
        g.map(|value| (value * counts_per_g).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
    }

    fn range(&self) -> AccelRange {
        match self.registers[ADDR_CTRL_REG2 as usize] & REG2_FULL_SCALE_MASK {
            0x08 => AccelRange::G4,
            0x10 => AccelRange::G6,
            0x18 => AccelRange::G8,
            0x20 => AccelRange::G16,
            _ => AccelRange::G2,
        }
    }
}

/// Register-file model of an LSM303D on an SPI bus
#[derive(Clone)]
pub struct SimulatedLsm303d {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedLsm303d {
    /// Part with power-on register values and no axis data queued
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Part that produces a fresh sample on every read
    pub fn with_waveform() -> Self {
        let sim = Self::new();
        sim.state().waveform = true;
        sim
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value the WHO_AM_I register reports
    pub fn set_identity(&self, id: u8) {
        self.state().registers[ADDR_WHO_AM_I as usize] = id;
    }

    /// Answer the next transaction with garbage, as after a reset
    pub fn set_stale_first_access(&self, stale: bool) {
        self.state().stale_first_access = stale;
    }

    /// Fail the next `count` transactions
    pub fn fail_next(&self, count: u32) {
        self.state().fail_next = count;
    }

    /// Fail every transaction until cleared
    pub fn fail_all(&self, fail: bool) {
        self.state().fail_all = fail;
    }

    /// Queue one X/Y/Z sample; each status-led read consumes one
    pub fn push_frame(&self, axes: [i16; 3]) {
        self.state().frames.push_back(axes);
    }

    pub fn pending_frames(&self) -> usize {
        self.state().frames.len()
    }

    pub fn register(&self, addr: u8) -> u8 {
        self.state().registers[(addr & ADDR_MASK) as usize]
    }

    pub fn set_register(&self, addr: u8, value: u8) {
        self.state().registers[(addr & ADDR_MASK) as usize] = value;
    }

    /// Transactions seen, including failed ones
    pub fn transactions(&self) -> u64 {
        self.state().transactions
    }
}

impl Default for SimulatedLsm303d {
    fn default() -> Self {
        Self::new()
    }
}

impl BusTransport for SimulatedLsm303d {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mut state = self.state();
        state.transactions += 1;

        if tx.len() != rx.len() {
            return Err(Lsm303dError::TransferError {
                expected: tx.len() as u32,
                actual: rx.len() as u32,
            });
        }
        if state.fail_all {
            return Err(Lsm303dError::CommunicationError("simulated bus fault".into()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Lsm303dError::CommunicationError("simulated bus fault".into()));
        }
        if tx.is_empty() {
            return Ok(());
        }
        if state.stale_first_access {
            state.stale_first_access = false;
            rx.fill(0x00);
            return Ok(());
        }

        let command = tx[0];
        let start = command & ADDR_MASK;
        let increment = command & ADDR_INCREMENT != 0;
        let address = |i: usize| {
            if increment {
                (start as usize + i) & ADDR_MASK as usize
            } else {
                start as usize
            }
        };

        rx[0] = 0xFF;
        if command & DIR_READ != 0 {
            if start == ADDR_STATUS_A || start == ADDR_OUT_X_L_A {
                state.latch_sample();
            }
            for i in 1..rx.len() {
                rx[i] = state.registers[address(i - 1)];
            }
        } else {
            for i in 1..tx.len() {
                let addr = address(i - 1);
                if addr != ADDR_WHO_AM_I as usize {
                    state.registers[addr] = tx[i];
                }
            }
            rx[1..].fill(0xFF);
        }
        Ok(())
    }
}

struct Registration {
    id: u64,
    interval: Duration,
    tick: Option<TickFn>,
}

#[derive(Default)]
struct ManualTimerState {
    next_id: u64,
    active: Option<Registration>,
    refuse_next: bool,
}

/// Host timer driven by hand
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualTimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManualTimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the registered callback `count` times; a no-op when nothing is registered
    pub fn fire(&self, count: usize) {
        for _ in 0..count {
            // Take the callback out so it runs without the timer lock held
            let (id, mut tick) = {
                let mut state = self.state();
                match state.active.as_mut() {
                    Some(active) => match active.tick.take() {
                        Some(tick) => (active.id, tick),
                        None => return,
                    },
                    None => return,
                }
            };

            tick();

            let mut state = self.state();
            if let Some(active) = state.active.as_mut() {
                if active.id == id {
                    active.tick = Some(tick);
                }
            }
        }
    }

    /// Make the next `register_periodic` fail with `TimerUnavailable`
    pub fn refuse_next_registration(&self) {
        self.state().refuse_next = true;
    }

    pub fn is_armed(&self) -> bool {
        self.state().active.is_some()
    }

    /// Interval of the current registration
    pub fn interval(&self) -> Option<Duration> {
        self.state().active.as_ref().map(|active| active.interval)
    }
}

impl HostTimer for ManualTimer {
    type Handle = u64;

    fn register_periodic(&mut self, interval: Duration, tick: TickFn) -> Result<Self::Handle> {
        let mut state = self.state();
        if std::mem::take(&mut state.refuse_next) {
            return Err(Lsm303dError::TimerUnavailable("registration refused".into()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.active = Some(Registration {
            id,
            interval,
            tick: Some(tick),
        });
        Ok(id)
    }

    fn cancel(&mut self, handle: Self::Handle) {
        let mut state = self.state();
        if state.active.as_ref().map(|active| active.id) == Some(handle) {
            state.active = None;
        }
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::Relaxed);
    }

    pub fn advance(&self, by_us: u64) {
        self.now_us.fetch_add(by_us, Ordering::Relaxed);
    }
}

impl MonotonicClock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Relaxed)
    }
}

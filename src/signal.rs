//! Outbound notification: the report sink and the data-available signal

use crate::report::Report;
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Fire-and-forget receiver of every successfully measured report
///
/// Called from the sampling tick, so implementations must return promptly.
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &Report);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn publish(&self, _report: &Report) {}
}

impl ReportSink for Sender<Report> {
    fn publish(&self, report: &Report) {
        // A dropped receiver is not the producer's problem
        let _ = self.send(*report);
    }
}

impl ReportSink for SyncSender<Report> {
    fn publish(&self, report: &Report) {
        // Never block the tick: drop the report when the channel is full
        let _ = self.try_send(*report);
    }
}

/// Wake-up signal raised after each report lands in the ring
///
/// Carries no payload. Waiters remember the generation they last saw and
/// sleep until it moves.
#[derive(Debug, Default)]
pub struct DataReady {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl DataReady {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the generation and wake every waiter
    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the generation differs from `seen` or `timeout` elapses
    ///
    /// # Returns
    /// The current generation and whether it moved past `seen`
    pub fn wait_timeout(&self, seen: u64, timeout: Duration) -> (u64, bool) {
        let guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |generation| *generation == seen)
            .unwrap_or_else(PoisonError::into_inner);
        (*guard, *guard != seen)
    }
}

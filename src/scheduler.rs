//! Sampling scheduler: the Stopped/Running state machine around one timer registration

use crate::error::{Lsm303dError, Result};
use crate::timer::{HostTimer, TickFn};
use std::time::Duration;

/// Owns at most one periodic registration with the host timer
///
/// Stopped means no registration is held. The last interval is kept across
/// [`stop`](Self::stop) so sampling can be resumed; [`set_manual`](Self::set_manual)
/// forgets it.
pub struct SamplingScheduler<T: HostTimer> {
    timer: T,
    interval_us: u64,
    handle: Option<T::Handle>,
}

impl<T: HostTimer> SamplingScheduler<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            interval_us: 0,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Configured period in microseconds, 0 in manual mode
    pub fn interval_us(&self) -> u64 {
        self.interval_us
    }

    /// Register `tick` to run every `interval_us`, restarting if already running
    ///
    /// The first tick fires after one interval. On failure the scheduler is
    /// left stopped.
    pub fn start(&mut self, interval_us: u64, tick: TickFn) -> Result<()> {
        if interval_us == 0 {
            return Err(Lsm303dError::InvalidParameter(
                "sampling interval must be non-zero".into(),
            ));
        }

        self.stop();
        let handle = self
            .timer
            .register_periodic(Duration::from_micros(interval_us), tick)?;
        self.interval_us = interval_us;
        self.handle = Some(handle);
        log::debug!("sampling every {} us", interval_us);
        Ok(())
    }

    /// Cancel the registration; a tick already running completes first
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.timer.cancel(handle);
            log::debug!("sampling stopped");
        }
    }

    /// Stop and forget the interval
    pub fn set_manual(&mut self) {
        self.stop();
        self.interval_us = 0;
    }
}

impl<T: HostTimer> Drop for SamplingScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ManualTimer;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU32>, TickFn) {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_created_stopped() {
        let scheduler = SamplingScheduler::new(ManualTimer::new());
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.interval_us(), 0);
    }

    #[test]
    fn test_start_registers_interval() {
        let timer = ManualTimer::new();
        let mut scheduler = SamplingScheduler::new(timer.clone());
        let (count, tick) = counter();

        scheduler.start(4000, tick).unwrap();
        assert!(scheduler.is_running());
        assert_eq!(timer.interval(), Some(Duration::from_micros(4000)));

        timer.fire(3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_restart_replaces_registration() {
        let timer = ManualTimer::new();
        let mut scheduler = SamplingScheduler::new(timer.clone());
        let (first, tick) = counter();
        scheduler.start(4000, tick).unwrap();

        let (second, tick) = counter();
        scheduler.start(1000, tick).unwrap();
        timer.fire(2);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(timer.interval(), Some(Duration::from_micros(1000)));
    }

    #[test]
    fn test_stop_is_idempotent_and_keeps_interval() {
        let timer = ManualTimer::new();
        let mut scheduler = SamplingScheduler::new(timer.clone());
        let (count, tick) = counter();
        scheduler.start(2500, tick).unwrap();

        scheduler.stop();
        scheduler.stop();
        timer.fire(5);

        assert!(!scheduler.is_running());
        assert!(!timer.is_armed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.interval_us(), 2500);

        scheduler.set_manual();
        assert_eq!(scheduler.interval_us(), 0);
    }

    #[test]
    fn test_zero_interval_rejected_without_state_change() {
        let timer = ManualTimer::new();
        let mut scheduler = SamplingScheduler::new(timer.clone());
        let (_, tick) = counter();
        scheduler.start(1000, tick).unwrap();

        let (_, tick) = counter();
        assert!(scheduler.start(0, tick).is_err());
        assert!(scheduler.is_running());
        assert_eq!(scheduler.interval_us(), 1000);
    }

    #[test]
    fn test_drop_cancels() {
        let timer = ManualTimer::new();
        {
            let mut scheduler = SamplingScheduler::new(timer.clone());
            let (_, tick) = counter();
            scheduler.start(1000, tick).unwrap();
            assert!(timer.is_armed());
        }
        assert!(!timer.is_armed());
    }
}

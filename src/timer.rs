//! Host periodic timer facility
//!
//! The driver only needs a periodic callback at a settable interval that can
//! be cancelled. The callback is a closure that owns typed handles to the state
//! it samples into, so no untyped context pointer is ever passed around.

use crate::error::{Lsm303dError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback run on every tick, outside the caller's context
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Periodic callback registration
pub trait HostTimer {
    type Handle;

    /// Run `tick` every `interval`, first after one full interval
    fn register_periodic(&mut self, interval: Duration, tick: TickFn) -> Result<Self::Handle>;

    /// Stop future ticks
    ///
    /// Must not return while a tick is still running, and must drop the
    /// callback, so the caller may reconfigure whatever the callback touches.
    fn cancel(&mut self, handle: Self::Handle);
}

/// Runs each registration on its own named thread
#[derive(Debug, Clone)]
pub struct ThreadTimer {
    name: String,
}

/// Registration handle for [`ThreadTimer`]
pub struct ThreadTimerHandle {
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ThreadTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new("lsm303d-tick")
    }
}

impl HostTimer for ThreadTimer {
    type Handle = ThreadTimerHandle;

    fn register_periodic(&mut self, interval: Duration, mut tick: TickFn) -> Result<Self::Handle> {
        if interval.is_zero() {
            return Err(Lsm303dError::InvalidParameter(
                "timer interval must be non-zero".into(),
            ));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut next_tick = Instant::now() + interval;
                loop {
                    // Park until the deadline; cancel() unparks us early
                    loop {
                        if flag.load(Ordering::Acquire) {
                            return;
                        }
                        let now = Instant::now();
                        if now >= next_tick {
                            break;
                        }
                        thread::park_timeout(next_tick - now);
                    }

                    tick();

                    next_tick += interval;
                    // If we're running behind, continue immediately
                }
            })
            .map_err(|e| Lsm303dError::TimerUnavailable(e.to_string()))?;

        Ok(ThreadTimerHandle { cancelled, thread })
    }

    fn cancel(&mut self, handle: Self::Handle) {
        handle.cancelled.store(true, Ordering::Release);
        handle.thread.thread().unpark();

        if handle.thread.thread().id() == thread::current().id() {
            // Cancelled from inside the tick: the loop exits on its own
            return;
        }
        if handle.thread.join().is_err() {
            log::warn!("timer thread '{}' panicked", self.name);
        }
    }
}

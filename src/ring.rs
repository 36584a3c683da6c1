//! Bounded overwrite-oldest report ring
//!
//! A fixed slot array with a write cursor and a read cursor. One slot is kept
//! as a sentinel so "empty" (cursors equal) and "full" differ, which leaves
//! room for `capacity - 1` unread reports. When the writer would run into the
//! oldest unread report, that report is dropped.
//!
//! There is no lock. The ring is written by exactly one producer (the sampling
//! tick) and read by any number of consumers:
//!
//! * the cursors are lap-tagged counters; the slot index is `cursor % capacity`,
//!   so a reader holding a stale cursor can never mistake a newer lap for it;
//! * each slot is a small seqlock, so a reader racing an overwrite sees a torn
//!   copy and retries instead of returning it;
//! * the producer writes the slot first, fixes the read cursor if it ran into
//!   it, and publishes the write cursor last with `Release`.

use crate::error::{Lsm303dError, Result};
use crate::report::{Report, REPORT_WORDS};
use std::hint;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

/// Smallest ring: one usable slot plus the sentinel
pub const MIN_CAPACITY: usize = 2;

struct Slot {
    seq: AtomicU32,
    words: [AtomicU64; REPORT_WORDS],
}

impl Slot {
    fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            words: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Producer only
    fn store(&self, report: &Report) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for (word, value) in self.words.iter().zip(report.to_words()) {
            word.store(value, Ordering::Relaxed);
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// `None` if the copy raced a store
    fn load(&self) -> Option<Report> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        let words: [u64; REPORT_WORDS] =
            std::array::from_fn(|i| self.words[i].load(Ordering::Relaxed));

        fence(Ordering::Acquire);
        if self.seq.load(Ordering::Relaxed) != before {
            return None;
        }
        Some(Report::from_words(&words))
    }
}

/// Fixed-capacity ring of reports
pub struct ReportRing {
    slots: Box<[Slot]>,
    /// Write cursor: total reports ever pushed since the last reset
    head: AtomicU64,
    /// Read cursor: total reports consumed or dropped since the last reset
    tail: AtomicU64,
    overruns: AtomicU64,
}

impl ReportRing {
    /// Allocate a ring with `capacity` slots, one of which is the sentinel
    ///
    /// # Returns
    /// * `Err(InvalidParameter)` - `capacity` below [`MIN_CAPACITY`]
    /// * `Err(OutOfMemory)` - the slot array could not be allocated
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity < MIN_CAPACITY {
            return Err(Lsm303dError::InvalidParameter(format!(
                "ring needs at least {} slots, got {}",
                MIN_CAPACITY, capacity
            )));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Lsm303dError::OutOfMemory { slots: capacity })?;
        slots.extend((0..capacity).map(|_| Slot::new()));

        Ok(Self {
            slots: slots.into_boxed_slice(),
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
        })
    }

    /// Total slots including the sentinel
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Most unread reports the ring can hold
    pub fn usable(&self) -> usize {
        self.slots.len() - 1
    }

    /// Unread reports right now
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read cursor as a slot index
    pub fn read_cursor(&self) -> usize {
        self.index(self.tail.load(Ordering::Acquire))
    }

    /// Write cursor as a slot index (the next slot to be overwritten)
    pub fn write_cursor(&self) -> usize {
        self.index(self.head.load(Ordering::Acquire))
    }

    /// Reports dropped because the writer caught up with them
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Append a report, dropping the oldest unread one if the ring is full
    ///
    /// Single producer: calls must not overlap each other or [`reset`](Self::reset).
    pub fn push(&self, report: &Report) {
        let head = self.head.load(Ordering::Relaxed);
        self.slots[self.index(head)].store(report);

        let next = head + 1;
        let usable = self.usable() as u64;
        let mut tail = self.tail.load(Ordering::Acquire);
        while next - tail > usable {
            match self.tail.compare_exchange_weak(
                tail,
                next - usable,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.overruns.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(current) => tail = current,
            }
        }

        self.head.store(next, Ordering::Release);
    }

    /// Take the oldest unread report
    pub fn pop(&self) -> Option<Report> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if tail >= head {
                return None;
            }

            let Some(report) = self.slots[self.index(tail)].load() else {
                hint::spin_loop();
                continue;
            };

            if self
                .tail
                .compare_exchange(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(report);
            }
        }
    }

    /// Take up to `max` unread reports, oldest first
    pub fn drain(&self, max: usize) -> Vec<Report> {
        let mut reports = Vec::with_capacity(max.min(self.len()));
        while reports.len() < max {
            match self.pop() {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        reports
    }

    /// Discard everything and move both cursors back to slot zero
    ///
    /// Only while no producer is running.
    pub fn reset(&self) {
        // head first, so a concurrent reader sees tail >= head and finds nothing
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
    }

    fn index(&self, cursor: u64) -> usize {
        (cursor % self.slots.len() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report(n: u64) -> Report {
        Report {
            timestamp_us: n,
            x_raw: n as i16,
            y_raw: (n as i16).wrapping_neg(),
            z_raw: 0,
            physical: None,
        }
    }

    fn stamps(reports: &[Report]) -> Vec<u64> {
        reports.iter().map(|r| r.timestamp_us).collect()
    }

    #[test]
    fn test_rejects_capacity_below_two() {
        assert!(matches!(
            ReportRing::with_capacity(1),
            Err(Lsm303dError::InvalidParameter(_))
        ));
        assert!(ReportRing::with_capacity(2).is_ok());
    }

    #[test]
    fn test_fifo_order() {
        let ring = ReportRing::with_capacity(8).unwrap();
        for n in 1..=5 {
            ring.push(&report(n));
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(stamps(&ring.drain(10)), vec![1, 2, 3, 4, 5]);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_writing_capacity_reports_drops_the_first() {
        let ring = ReportRing::with_capacity(4).unwrap();
        for n in 1..=4 {
            ring.push(&report(n));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.overruns(), 1);
        assert_eq!(stamps(&ring.drain(10)), vec![2, 3, 4]);
    }

    #[test]
    fn test_three_slot_ring_keeps_last_two() {
        let ring = ReportRing::with_capacity(3).unwrap();
        for n in 1..=4 {
            ring.push(&report(n));
        }
        assert_eq!(stamps(&ring.drain(10)), vec![3, 4]);
    }

    #[test]
    fn test_never_more_than_usable_unread() {
        let ring = ReportRing::with_capacity(5).unwrap();
        for n in 0..37 {
            ring.push(&report(n));
            assert!(ring.len() <= ring.usable());
            if n % 7 == 0 {
                ring.pop();
            }
        }
        let drained = stamps(&ring.drain(usize::MAX));
        assert_eq!(drained, vec![33, 34, 35, 36]);
    }

    #[test]
    fn test_cursors_are_slot_indices() {
        let ring = ReportRing::with_capacity(3).unwrap();
        assert_eq!((ring.read_cursor(), ring.write_cursor()), (0, 0));
        ring.push(&report(1));
        ring.push(&report(2));
        assert_eq!((ring.read_cursor(), ring.write_cursor()), (0, 2));
        ring.push(&report(3));
        // writer wrapped onto the oldest slot and pushed the reader along
        assert_eq!((ring.read_cursor(), ring.write_cursor()), (1, 0));
    }

    #[test]
    fn test_reset_discards_unread() {
        let ring = ReportRing::with_capacity(4).unwrap();
        ring.push(&report(1));
        ring.push(&report(2));
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!((ring.read_cursor(), ring.write_cursor()), (0, 0));
        ring.push(&report(3));
        assert_eq!(stamps(&ring.drain(10)), vec![3]);
    }

    #[test]
    fn test_drain_respects_max() {
        let ring = ReportRing::with_capacity(10).unwrap();
        for n in 1..=6 {
            ring.push(&report(n));
        }
        assert_eq!(stamps(&ring.drain(2)), vec![1, 2]);
        assert_eq!(stamps(&ring.drain(2)), vec![3, 4]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_concurrent_reader_sees_increasing_untorn_reports() {
        const TOTAL: u64 = 200_000;
        let ring = Arc::new(ReportRing::with_capacity(4).unwrap());
        let producer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            for n in 1..=TOTAL {
                producer_ring.push(&report(n));
            }
        });

        let mut last = 0u64;
        let mut seen = 0u64;
        while last < TOTAL {
            if let Some(r) = ring.pop() {
                assert!(r.timestamp_us > last, "{} after {}", r.timestamp_us, last);
                // every field comes from the same push
                assert_eq!(r.x_raw, r.timestamp_us as i16);
                assert_eq!(r.y_raw, (r.timestamp_us as i16).wrapping_neg());
                last = r.timestamp_us;
                seen += 1;
            } else if producer.is_finished() && ring.is_empty() {
                break;
            }
        }
        producer.join().unwrap();

        assert!(seen > 0);
        assert_eq!(seen + ring.overruns(), TOTAL - ring.len() as u64);
    }
}

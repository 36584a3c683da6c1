//! Common utilities: the monotonic clock and console helpers

use std::time::Instant;

/// Microsecond monotonic time source used to stamp reports
pub trait MonotonicClock: Send + Sync {
    fn now_us(&self) -> u64;
}

/// Tracks elapsed time since creation
#[derive(Debug, Clone, Copy)]
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    /// Create a new TimeKeeper starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for TimeKeeper {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Create a horizontal bar graph for a value
///
/// # Arguments
/// * `value` - The value to display
/// * `max_value` - Maximum absolute value (defines scale)
/// * `width` - Total width of the bar in characters
///
/// # Example
/// ```
/// use lsm303d_sampler::create_bar;
///
/// // Display +9.8 m/s^2 on a +/-19.6 m/s^2 scale with 40-char width
/// let bar = create_bar(9.8, 19.6, 40);
/// println!("[{}]", bar);
/// ```
pub fn create_bar(value: f32, max_value: f32, width: usize) -> String {
    let normalized = (value / max_value).clamp(-1.0, 1.0);
    let center = width / 2;
    let bar_length = ((normalized.abs() * center as f32) as usize).min(center);

    let mut bar = String::new();

    if normalized < 0.0 {
        bar.push_str(&" ".repeat(center - bar_length));
        bar.push_str(&"█".repeat(bar_length));
        bar.push('|');
        bar.push_str(&" ".repeat(center));
    } else {
        bar.push_str(&" ".repeat(center));
        bar.push('|');
        bar.push_str(&"█".repeat(bar_length));
        bar.push_str(&" ".repeat(center - bar_length));
    }

    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_bar_zero() {
        let bar = create_bar(0.0, 2.0, 40);
        assert_eq!(bar.chars().count(), 41); // 40 chars + 1 center marker
        assert!(bar.contains('|'));
    }

    #[test]
    fn test_create_bar_negative() {
        let bar = create_bar(-1.0, 2.0, 40);
        assert_eq!(bar.chars().count(), 41);
        assert!(bar.starts_with(' ') && bar.contains('█'));
    }

    #[test]
    fn test_create_bar_clamps() {
        let bar = create_bar(50.0, 2.0, 10);
        assert_eq!(bar, "     |█████");
    }

    #[test]
    fn test_timekeeper_is_monotonic_micros() {
        let keeper = TimeKeeper::new();
        let first = keeper.now_us();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = keeper.now_us();
        assert!(second >= first + 10_000);
        assert!(keeper.elapsed_secs() < 1.0);
    }
}

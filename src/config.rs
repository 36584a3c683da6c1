//! Driver configuration

use crate::error::{Lsm303dError, Result};
use crate::registers::{AccelRange, OutputDataRate};

/// Tunables fixed at driver construction
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Usable report slots allocated at init (the ring gets one more)
    pub queue_depth: usize,
    /// Largest depth `set_queue_depth` accepts
    pub max_queue_depth: usize,
    /// Rate selected by `PollRate::Default`
    pub default_poll_hz: u32,
    /// Shortest sampling interval accepted
    pub min_interval_us: u64,
    /// Full-scale range written at init
    pub range: AccelRange,
    /// Output data rate written at init
    pub output_data_rate: OutputDataRate,
    /// Attach the linear calibration policy at init
    pub calibrate: bool,
    /// Raise the output data rate when polling faster than it
    pub follow_poll_rate: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1,
            max_queue_depth: 99,
            default_poll_hz: 250,
            min_interval_us: 1000,
            range: AccelRange::G2,
            output_data_rate: OutputDataRate::Hz400,
            calibrate: true,
            follow_poll_rate: true,
        }
    }
}

impl DriverConfig {
    /// Fastest poll rate the interval floor allows
    pub fn max_poll_hz(&self) -> u32 {
        (1_000_000 / self.min_interval_us.max(1)).min(u32::MAX as u64) as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 || self.queue_depth > self.max_queue_depth {
            return Err(Lsm303dError::InvalidParameter(format!(
                "queue depth {} outside 1..={}",
                self.queue_depth, self.max_queue_depth
            )));
        }
        if self.min_interval_us == 0 {
            return Err(Lsm303dError::InvalidParameter(
                "minimum interval must be non-zero".into(),
            ));
        }
        if self.default_poll_hz == 0 || self.default_poll_hz > self.max_poll_hz() {
            return Err(Lsm303dError::InvalidParameter(format!(
                "default poll rate {} Hz outside 1..={}",
                self.default_poll_hz,
                self.max_poll_hz()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_poll_hz(), 1000);
    }

    #[test]
    fn test_rejects_bad_depths_and_rates() {
        let zero_depth = DriverConfig {
            queue_depth: 0,
            ..Default::default()
        };
        assert!(zero_depth.validate().is_err());

        let too_fast = DriverConfig {
            default_poll_hz: 2000,
            ..Default::default()
        };
        assert!(too_fast.validate().is_err());

        let no_floor = DriverConfig {
            min_interval_us: 0,
            ..Default::default()
        };
        assert!(no_floor.validate().is_err());
    }
}

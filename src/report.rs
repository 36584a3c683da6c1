//! Sampled measurement records

use crate::registers::{SAMPLE_BURST_LEN, STATUS_A_ZYXDA, STATUS_A_ZYXOR};

/// Per-axis static offset (m/s^2) and linear scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationScale {
    pub x_offset: f32,
    pub x_scale: f32,
    pub y_offset: f32,
    pub y_scale: f32,
    pub z_offset: f32,
    pub z_scale: f32,
}

impl Default for CalibrationScale {
    fn default() -> Self {
        Self {
            x_offset: 0.0,
            x_scale: 1.0,
            y_offset: 0.0,
            y_scale: 1.0,
            z_offset: 0.0,
            z_scale: 1.0,
        }
    }
}

/// Physical values derived by the calibration policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalAxes {
    /// X acceleration in m/s^2
    pub x: f32,
    /// Y acceleration in m/s^2
    pub y: f32,
    /// Z acceleration in m/s^2
    pub z: f32,
    /// m/s^2 per raw count used for the conversion
    pub scaling: f32,
    /// Full-scale magnitude in m/s^2 at the time of sampling
    pub range_m_s2: f32,
    /// Offsets and scales the values were produced with
    pub calibration: CalibrationScale,
}

/// One sampled accelerometer measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// X-axis (raw value)
    pub x_raw: i16,
    /// Y-axis (raw value)
    pub y_raw: i16,
    /// Z-axis (raw value)
    pub z_raw: i16,
    /// Calibrated values, present when a calibration policy is active
    pub physical: Option<PhysicalAxes>,
}

impl Report {
    /// Raw axes as an array
    pub fn raw(&self) -> [i16; 3] {
        [self.x_raw, self.y_raw, self.z_raw]
    }

    /// Calibrated acceleration in m/s^2, if calibration was active
    pub fn accel_m_s2(&self) -> Option<(f32, f32, f32)> {
        self.physical.map(|p| (p.x, p.y, p.z))
    }
}

/// Status byte and axes decoded from one sample burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub status: u8,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    /// Decode STATUS_A followed by little-endian X/Y/Z pairs
    pub fn from_burst(frame: &[u8; SAMPLE_BURST_LEN]) -> Self {
        Self {
            status: frame[0],
            x: i16::from_le_bytes([frame[1], frame[2]]),
            y: i16::from_le_bytes([frame[3], frame[4]]),
            z: i16::from_le_bytes([frame[5], frame[6]]),
        }
    }

    pub fn axes(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    /// New X/Y/Z data since the previous read
    pub fn data_ready(&self) -> bool {
        self.status & STATUS_A_ZYXDA != 0
    }

    /// The part converted again before the previous sample was read
    pub fn overrun(&self) -> bool {
        self.status & STATUS_A_ZYXOR != 0
    }
}

// Ring slot layout: report packed into plain words so a slot can be published
// with atomic stores and read back without a lock.
//
//   word 0     timestamp_us
//   word 1     x_raw | y_raw << 16 | z_raw << 32 | has_physical << 48
//   words 2-7  eleven f32 bit patterns, two per word (high half first)
pub(crate) const REPORT_WORDS: usize = 8;
const PHYSICAL_FLOATS: usize = 11;

impl Report {
    pub(crate) fn to_words(&self) -> [u64; REPORT_WORDS] {
        let mut words = [0u64; REPORT_WORDS];
        words[0] = self.timestamp_us;
        words[1] = (self.x_raw as u16 as u64)
            | (self.y_raw as u16 as u64) << 16
            | (self.z_raw as u16 as u64) << 32
            | (self.physical.is_some() as u64) << 48;

        if let Some(p) = self.physical {
            let c = p.calibration;
            let floats: [f32; PHYSICAL_FLOATS] = [
                p.x,
                p.y,
                p.z,
                p.scaling,
                p.range_m_s2,
                c.x_offset,
                c.x_scale,
                c.y_offset,
                c.y_scale,
                c.z_offset,
                c.z_scale,
            ];
            for (i, pair) in floats.chunks(2).enumerate() {
                let high = pair[0].to_bits() as u64;
                let low = pair.get(1).map_or(0, |f| f.to_bits() as u64);
                words[2 + i] = high << 32 | low;
            }
        }
        words
    }

    pub(crate) fn from_words(words: &[u64; REPORT_WORDS]) -> Self {
        let raw = words[1];
        let physical = if (raw >> 48) & 1 == 1 {
            let mut floats = [0f32; PHYSICAL_FLOATS];
            for (i, value) in floats.iter_mut().enumerate() {
                let word = words[2 + i / 2];
                let bits = if i % 2 == 0 { word >> 32 } else { word & 0xFFFF_FFFF };
                *value = f32::from_bits(bits as u32);
            }
            Some(PhysicalAxes {
                x: floats[0],
                y: floats[1],
                z: floats[2],
                scaling: floats[3],
                range_m_s2: floats[4],
                calibration: CalibrationScale {
                    x_offset: floats[5],
                    x_scale: floats[6],
                    y_offset: floats[7],
                    y_scale: floats[8],
                    z_offset: floats[9],
                    z_scale: floats[10],
                },
            })
        } else {
            None
        };

        Self {
            timestamp_us: words[0],
            x_raw: raw as u16 as i16,
            y_raw: (raw >> 16) as u16 as i16,
            z_raw: (raw >> 32) as u16 as i16,
            physical,
        }
    }
}

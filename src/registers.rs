//! LSM303D register map and field encodings
//!
//! Only the accelerometer half of the part is sampled. Magnetometer and
//! temperature addresses are listed for completeness of the map.

use std::fmt;

// SPI protocol address bits
pub const DIR_READ: u8 = 1 << 7;
pub const DIR_WRITE: u8 = 0;
pub const ADDR_INCREMENT: u8 = 1 << 6;
/// Register addresses occupy the low six bits of the command byte
pub const ADDR_MASK: u8 = 0x3F;

// Register addresses
pub const ADDR_TEMP_OUT_L: u8 = 0x05;
pub const ADDR_TEMP_OUT_H: u8 = 0x06;
pub const ADDR_STATUS_M: u8 = 0x07;
pub const ADDR_OUT_X_L_M: u8 = 0x08;
pub const ADDR_WHO_AM_I: u8 = 0x0F;
pub const ADDR_INT_CTRL_M: u8 = 0x12;
pub const ADDR_INT_SRC_M: u8 = 0x13;
pub const ADDR_CTRL_REG0: u8 = 0x1F;
pub const ADDR_CTRL_REG1: u8 = 0x20;
pub const ADDR_CTRL_REG2: u8 = 0x21;
pub const ADDR_STATUS_A: u8 = 0x27;
pub const ADDR_OUT_X_L_A: u8 = 0x28;
pub const ADDR_OUT_X_H_A: u8 = 0x29;
pub const ADDR_OUT_Y_L_A: u8 = 0x2A;
pub const ADDR_OUT_Y_H_A: u8 = 0x2B;
pub const ADDR_OUT_Z_L_A: u8 = 0x2C;
pub const ADDR_OUT_Z_H_A: u8 = 0x2D;

/// Expected WHO_AM_I value
pub const WHO_I_AM: u8 = 0x49;

// CTRL_REG1 bits
pub const REG1_RATE_MASK: u8 = 0xF0;
pub const REG1_BDU: u8 = 1 << 3;
pub const REG1_Z_ENABLE_A: u8 = 1 << 2;
pub const REG1_Y_ENABLE_A: u8 = 1 << 1;
pub const REG1_X_ENABLE_A: u8 = 1 << 0;
pub const REG1_XYZ_ENABLE_A: u8 = REG1_X_ENABLE_A | REG1_Y_ENABLE_A | REG1_Z_ENABLE_A;

// CTRL_REG2 bits
pub const REG2_FULL_SCALE_MASK: u8 = 0x38;

// STATUS_A bits
pub const STATUS_A_ZYXDA: u8 = 1 << 3;
pub const STATUS_A_ZYXOR: u8 = 1 << 7;

/// Status byte plus X/Y/Z low/high pairs, fetched in one auto-increment burst
pub const SAMPLE_BURST_LEN: usize = 7;

/// Standard gravity used to convert g to m/s^2
pub const GRAVITY_M_S2: f32 = 9.80665;

/// Accelerometer full-scale selection (CTRL_REG2 AFS bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelRange {
    /// +/-2 g (power-on default)
    #[default]
    G2,
    /// +/-4 g
    G4,
    /// +/-6 g
    G6,
    /// +/-8 g
    G8,
    /// +/-16 g
    G16,
}

impl AccelRange {
    const ALL: [AccelRange; 5] = [
        AccelRange::G2,
        AccelRange::G4,
        AccelRange::G6,
        AccelRange::G8,
        AccelRange::G16,
    ];

    /// Smallest range that still reads `max_g` without clipping; 0 selects the largest
    pub fn covering(max_g: u32) -> Option<Self> {
        if max_g == 0 {
            return Some(AccelRange::G16);
        }
        Self::ALL.into_iter().find(|range| range.g() >= max_g)
    }

    /// Full-scale magnitude in g
    pub fn g(self) -> u32 {
        match self {
            AccelRange::G2 => 2,
            AccelRange::G4 => 4,
            AccelRange::G6 => 6,
            AccelRange::G8 => 8,
            AccelRange::G16 => 16,
        }
    }

    /// Sensitivity in mg/LSB from the datasheet
    pub fn sensitivity_mg(self) -> f32 {
        match self {
            AccelRange::G2 => 0.061,
            AccelRange::G4 => 0.122,
            AccelRange::G6 => 0.183,
            AccelRange::G8 => 0.244,
            AccelRange::G16 => 0.732,
        }
    }

    /// Conversion factor from raw counts to m/s^2
    pub fn scaling_m_s2(self) -> f32 {
        self.sensitivity_mg() / 1000.0 * GRAVITY_M_S2
    }

    /// Full-scale magnitude in m/s^2
    pub fn range_m_s2(self) -> f32 {
        self.g() as f32 * GRAVITY_M_S2
    }

    /// CTRL_REG2 AFS field, already shifted into place
    pub fn bits(self) -> u8 {
        let afs = match self {
            AccelRange::G2 => 0b000,
            AccelRange::G4 => 0b001,
            AccelRange::G6 => 0b010,
            AccelRange::G8 => 0b011,
            AccelRange::G16 => 0b100,
        };
        afs << 3
    }
}

impl fmt::Display for AccelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+/-{}g", self.g())
    }
}

/// Accelerometer output data rate (CTRL_REG1 AODR bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDataRate {
    Hz3_125,
    Hz6_25,
    Hz12_5,
    Hz25,
    Hz50,
    Hz100,
    Hz200,
    Hz400,
    Hz800,
    Hz1600,
}

impl OutputDataRate {
    const ALL: [OutputDataRate; 10] = [
        OutputDataRate::Hz3_125,
        OutputDataRate::Hz6_25,
        OutputDataRate::Hz12_5,
        OutputDataRate::Hz25,
        OutputDataRate::Hz50,
        OutputDataRate::Hz100,
        OutputDataRate::Hz200,
        OutputDataRate::Hz400,
        OutputDataRate::Hz800,
        OutputDataRate::Hz1600,
    ];

    /// Slowest rate that converts at least `hz` times per second; 0 selects the fastest
    pub fn at_least(hz: u32) -> Option<Self> {
        if hz == 0 {
            return Some(OutputDataRate::Hz1600);
        }
        Self::ALL.into_iter().find(|rate| rate.millihertz() >= hz as u64 * 1000)
    }

    /// Conversion rate in mHz (3.125 Hz is not an integer)
    pub fn millihertz(self) -> u64 {
        match self {
            OutputDataRate::Hz3_125 => 3_125,
            OutputDataRate::Hz6_25 => 6_250,
            OutputDataRate::Hz12_5 => 12_500,
            OutputDataRate::Hz25 => 25_000,
            OutputDataRate::Hz50 => 50_000,
            OutputDataRate::Hz100 => 100_000,
            OutputDataRate::Hz200 => 200_000,
            OutputDataRate::Hz400 => 400_000,
            OutputDataRate::Hz800 => 800_000,
            OutputDataRate::Hz1600 => 1_600_000,
        }
    }

    /// CTRL_REG1 AODR field, already shifted into place
    pub fn bits(self) -> u8 {
        let aodr = match self {
            OutputDataRate::Hz3_125 => 0b0001,
            OutputDataRate::Hz6_25 => 0b0010,
            OutputDataRate::Hz12_5 => 0b0011,
            OutputDataRate::Hz25 => 0b0100,
            OutputDataRate::Hz50 => 0b0101,
            OutputDataRate::Hz100 => 0b0110,
            OutputDataRate::Hz200 => 0b0111,
            OutputDataRate::Hz400 => 0b1000,
            OutputDataRate::Hz800 => 0b1001,
            OutputDataRate::Hz1600 => 0b1010,
        };
        aodr << 4
    }
}

impl fmt::Display for OutputDataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mhz = self.millihertz();
        if mhz % 1000 == 0 {
            write!(f, "{} Hz", mhz / 1000)
        } else {
            write!(f, "{} Hz", mhz as f64 / 1000.0)
        }
    }
}

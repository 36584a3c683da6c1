//! Error types for the LSM303D sampling driver

use thiserror::Error;

#[cfg(feature = "ftdi")]
use crate::ffi::{status_to_string, FT_OK, FT_STATUS};

/// Error type for LSM303D operations
#[derive(Error, Debug)]
pub enum Lsm303dError {
    /// FTDI driver error
    #[cfg(feature = "ftdi")]
    #[error("FTDI error: {status} ({description})")]
    FtdiError {
        status: FT_STATUS,
        description: String,
    },

    /// No SPI channels found
    #[error("No SPI channels found")]
    NoChannelsFound,

    /// Invalid channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Bus exchange failed
    #[error("Device communication error: {0}")]
    CommunicationError(String),

    /// Invalid WHO_AM_I response
    #[error("Invalid WHO_AM_I response: expected 0x49, got 0x{0:02X}")]
    InvalidDeviceId(u8),

    /// Short transfer on the bus
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: u32, actual: u32 },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Report ring could not be allocated; the previous ring is kept
    #[error("Out of memory allocating a {slots}-slot report ring")]
    OutOfMemory { slots: usize },

    /// No report is available yet in automatic mode
    #[error("No report available, try again")]
    WouldBlock,

    /// The host timer refused the periodic registration
    #[error("Host timer unavailable: {0}")]
    TimerUnavailable(String),

    /// Operation exists for interface completeness only
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Report recording failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Lsm303dError {
    /// True for the empty-ring result, which callers treat as "poll again" rather than a failure
    pub fn is_would_block(&self) -> bool {
        matches!(self, Lsm303dError::WouldBlock)
    }
}

#[cfg(feature = "ftdi")]
impl From<FT_STATUS> for Lsm303dError {
    fn from(status: FT_STATUS) -> Self {
        debug_assert_ne!(status, FT_OK, "FT_OK is not an error");
        Lsm303dError::FtdiError {
            status,
            description: status_to_string(status).to_string(),
        }
    }
}

/// Result type for LSM303D operations
pub type Result<T> = std::result::Result<T, Lsm303dError>;

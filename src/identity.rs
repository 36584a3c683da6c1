//! One-shot identity probe

use crate::error::{Lsm303dError, Result};
use crate::protocol::RegisterProtocol;
use crate::registers::{ADDR_WHO_AM_I, WHO_I_AM};
use crate::transport::BusTransport;

/// Read WHO_AM_I, discarding a first dummy access
///
/// After reset the part's SPI state machine may answer the first transaction
/// with garbage, so only the second read counts.
pub fn read_identity<B: BusTransport>(protocol: &mut RegisterProtocol<B>) -> Result<u8> {
    let _ = protocol.read_register(ADDR_WHO_AM_I)?;
    protocol.read_register(ADDR_WHO_AM_I)
}

/// True only when the attached part reports the LSM303D identity code
pub fn probe<B: BusTransport>(protocol: &mut RegisterProtocol<B>) -> Result<bool> {
    Ok(read_identity(protocol)? == WHO_I_AM)
}

/// Like [`probe`], but a mismatch becomes [`Lsm303dError::InvalidDeviceId`]
pub fn verify<B: BusTransport>(protocol: &mut RegisterProtocol<B>) -> Result<()> {
    match read_identity(protocol)? {
        WHO_I_AM => Ok(()),
        other => Err(Lsm303dError::InvalidDeviceId(other)),
    }
}

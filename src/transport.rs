//! Bus transport: the raw full-duplex byte exchange the register protocol runs on

use crate::error::{Lsm303dError, Result};
use crate::sim::SimulatedLsm303d;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ftdi")]
use crate::ffi::*;
#[cfg(feature = "ftdi")]
use std::ptr;

/// Synchronous full-duplex byte exchange with the device
///
/// `tx` is clocked out while `rx` fills; both slices have the same length.
/// The transport performs no retries and no error detection beyond what the
/// underlying link reports.
pub trait BusTransport {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        (**self).exchange(tx, rx)
    }
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        (**self).exchange(tx, rx)
    }
}

/// Where the bus transport comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process register model of the part
    #[default]
    Sim,
    /// FT232H SPI via libMPSSE
    Ftdi,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sim" => Ok(Backend::Sim),
            "ftdi" => Ok(Backend::Ftdi),
            other => Err(format!("unknown backend '{}', expected 'sim' or 'ftdi'", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sim => write!(f, "sim"),
            Backend::Ftdi => write!(f, "ftdi"),
        }
    }
}

/// Open the selected backend as a boxed transport
///
/// # Arguments
/// * `backend` - Transport to open
/// * `channel_index` - MPSSE channel for [`Backend::Ftdi`], ignored otherwise
pub fn open_backend(backend: Backend, channel_index: u32) -> Result<Box<dyn BusTransport + Send>> {
    match backend {
        Backend::Sim => Ok(Box::new(SimulatedLsm303d::with_waveform())),
        #[cfg(feature = "ftdi")]
        Backend::Ftdi => Ok(Box::new(MpsseSpi::open(channel_index)?)),
        #[cfg(not(feature = "ftdi"))]
        Backend::Ftdi => {
            let _ = channel_index;
            Err(Lsm303dError::Unsupported("built without the 'ftdi' feature"))
        }
    }
}

/// FT232H SPI transport through libMPSSE
#[cfg(feature = "ftdi")]
pub struct MpsseSpi {
    handle: FT_HANDLE,
}

// SAFETY: the handle is owned exclusively by this value and libMPSSE channel
// calls are not tied to the opening thread.
#[cfg(feature = "ftdi")]
unsafe impl Send for MpsseSpi {}

#[cfg(feature = "ftdi")]
impl MpsseSpi {
    /// Open and configure an SPI channel (mode 3, CS on DBUS3, active low)
    ///
    /// # Arguments
    /// * `channel_index` - Index of the SPI channel to use (usually 0)
    pub fn open(channel_index: u32) -> Result<Self> {
        let mut num_channels: DWORD = 0;
        let status = unsafe { SPI_GetNumChannels(&mut num_channels) };
        if status != FT_OK {
            return Err(status.into());
        }

        if num_channels == 0 {
            return Err(Lsm303dError::NoChannelsFound);
        }

        if channel_index >= num_channels {
            return Err(Lsm303dError::InvalidChannel(channel_index));
        }

        let mut handle: FT_HANDLE = ptr::null_mut();
        let status = unsafe { SPI_OpenChannel(channel_index, &mut handle) };
        if status != FT_OK {
            return Err(status.into());
        }

        let mut config = ChannelConfig::default();
        let status = unsafe { SPI_InitChannel(handle, &mut config) };
        if status != FT_OK {
            unsafe { SPI_CloseChannel(handle) };
            return Err(status.into());
        }

        log::info!(
            "opened MPSSE SPI channel {} at {} Hz",
            channel_index,
            config.ClockRate
        );
        Ok(Self { handle })
    }
}

#[cfg(feature = "ftdi")]
impl BusTransport for MpsseSpi {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Lsm303dError::InvalidParameter(format!(
                "exchange needs equal lengths, got tx {} rx {}",
                tx.len(),
                rx.len()
            )));
        }

        // SPI_ReadWrite takes a mutable out buffer even though it only reads it
        let mut out = [0u8; 64];
        let len = tx.len();
        if len > out.len() {
            return Err(Lsm303dError::InvalidParameter(format!(
                "exchange of {} bytes exceeds {}",
                len,
                out.len()
            )));
        }
        out[..len].copy_from_slice(tx);

        let mut transferred: DWORD = 0;
        let options = SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES
            | SPI_TRANSFER_OPTIONS_CHIPSELECT_ENABLE
            | SPI_TRANSFER_OPTIONS_CHIPSELECT_DISABLE;

        let status = unsafe {
            SPI_ReadWrite(
                self.handle,
                rx.as_mut_ptr(),
                out.as_mut_ptr(),
                len as DWORD,
                &mut transferred,
                options,
            )
        };

        if status != FT_OK {
            return Err(status.into());
        }

        if transferred != len as DWORD {
            return Err(Lsm303dError::TransferError {
                expected: len as u32,
                actual: transferred,
            });
        }

        Ok(())
    }
}

#[cfg(feature = "ftdi")]
impl Drop for MpsseSpi {
    fn drop(&mut self) {
        unsafe {
            SPI_CloseChannel(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("sim".parse::<Backend>(), Ok(Backend::Sim));
        assert_eq!("ftdi".parse::<Backend>(), Ok(Backend::Ftdi));
        assert!("usb".parse::<Backend>().is_err());
        assert_eq!(Backend::Ftdi.to_string(), "ftdi");
    }

    #[test]
    fn test_open_sim_backend_answers_who_am_i() {
        let mut bus = open_backend(Backend::Sim, 0).unwrap();
        let mut rx = [0u8; 2];
        bus.exchange(&[crate::registers::ADDR_WHO_AM_I | crate::registers::DIR_READ, 0], &mut rx)
            .unwrap();
        assert_eq!(rx[1], crate::registers::WHO_I_AM);
    }

    #[cfg(not(feature = "ftdi"))]
    #[test]
    fn test_ftdi_backend_needs_feature() {
        assert!(matches!(
            open_backend(Backend::Ftdi, 0),
            Err(Lsm303dError::Unsupported(_))
        ));
    }
}

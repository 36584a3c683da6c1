//! Register-level access to the LSM303D over the bus transport
//!
//! Every operation is a single SPI transaction: a command byte (register
//! address plus direction and auto-increment bits) followed by data or
//! placeholder bytes. Nothing here retries; a transport failure is returned
//! to the caller as-is.

use crate::error::{Lsm303dError, Result};
use crate::registers::{ADDR_INCREMENT, ADDR_MASK, DIR_READ, DIR_WRITE};
use crate::transport::BusTransport;

/// Largest burst a single transaction may carry
pub const MAX_BURST_LEN: usize = 32;

/// Register protocol bound to one bus transport
pub struct RegisterProtocol<B> {
    bus: B,
    transactions: u64,
}

impl<B: BusTransport> RegisterProtocol<B> {
    /// Wrap a transport
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            transactions: 0,
        }
    }

    /// Read a single byte from a register
    pub fn read_register(&mut self, reg: u8) -> Result<u8> {
        let tx = [command(reg, DIR_READ)?, 0];
        let mut rx = [0u8; 2];
        self.exchange(&tx, &mut rx)?;
        Ok(rx[1])
    }

    /// Write a single byte to a register, without readback
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        let tx = [command(reg, DIR_WRITE)?, value];
        let mut rx = [0u8; 2];
        self.exchange(&tx, &mut rx)
    }

    /// Read-modify-write a register; bits are cleared before bits are set
    ///
    /// Two transactions. The caller must hold exclusive access to the bus
    /// for the duration.
    pub fn modify_register(&mut self, reg: u8, clear_bits: u8, set_bits: u8) -> Result<()> {
        let value = self.read_register(reg)?;
        self.write_register(reg, (value & !clear_bits) | set_bits)
    }

    /// Read `out.len()` consecutive registers starting at `start` in one transaction
    ///
    /// Relies on the part's address auto-increment. Allocation-free, so it is
    /// safe to call from the sampling tick.
    pub fn read_burst(&mut self, start: u8, out: &mut [u8]) -> Result<()> {
        let count = out.len();
        if count == 0 {
            return Ok(());
        }
        if count > MAX_BURST_LEN {
            return Err(Lsm303dError::InvalidParameter(format!(
                "burst of {} registers exceeds {}",
                count, MAX_BURST_LEN
            )));
        }
        if start as usize + count - 1 > ADDR_MASK as usize {
            return Err(Lsm303dError::InvalidParameter(format!(
                "burst 0x{:02X}+{} runs past the register map",
                start, count
            )));
        }

        let mut tx = [0u8; MAX_BURST_LEN + 1];
        let mut rx = [0u8; MAX_BURST_LEN + 1];
        tx[0] = command(start, DIR_READ | ADDR_INCREMENT)?;
        self.exchange(&tx[..=count], &mut rx[..=count])?;
        out.copy_from_slice(&rx[1..=count]);
        Ok(())
    }

    /// Number of transactions issued so far
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Borrow the underlying transport
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        self.transactions += 1;
        self.bus.exchange(tx, rx)
    }
}

fn command(reg: u8, flags: u8) -> Result<u8> {
    if reg > ADDR_MASK {
        return Err(Lsm303dError::InvalidParameter(format!(
            "register address 0x{:02X} out of range",
            reg
        )));
    }
    Ok(reg | flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::*;
    use std::collections::VecDeque;

    /// Records every frame and answers from a script
    #[derive(Default)]
    struct RecordingBus {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        fail: bool,
    }

    impl BusTransport for RecordingBus {
        fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
            self.sent.push(tx.to_vec());
            if self.fail {
                return Err(Lsm303dError::CommunicationError("link down".into()));
            }
            if let Some(reply) = self.replies.pop_front() {
                rx.copy_from_slice(&reply);
            }
            Ok(())
        }
    }

    #[test]
    fn test_read_register_sets_read_bit_and_returns_second_byte() {
        let mut bus = RecordingBus::default();
        bus.replies.push_back(vec![0xFF, 0x49]);
        let mut protocol = RegisterProtocol::new(bus);

        assert_eq!(protocol.read_register(ADDR_WHO_AM_I).unwrap(), 0x49);
        assert_eq!(protocol.bus_mut().sent, vec![vec![0x8F, 0x00]]);
    }

    #[test]
    fn test_write_register_frame() {
        let mut protocol = RegisterProtocol::new(RecordingBus::default());
        protocol.write_register(ADDR_CTRL_REG1, 0x67).unwrap();
        assert_eq!(protocol.bus_mut().sent, vec![vec![0x20, 0x67]]);
    }

    #[test]
    fn test_modify_register_clears_before_setting() {
        let mut bus = RecordingBus::default();
        bus.replies.push_back(vec![0x00, 0b1111_0111]);
        let mut protocol = RegisterProtocol::new(bus);

        protocol
            .modify_register(ADDR_CTRL_REG1, REG1_RATE_MASK, OutputDataRate::Hz400.bits())
            .unwrap();

        let sent = &protocol.bus_mut().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], vec![ADDR_CTRL_REG1, 0b1000_0111]);
        assert_eq!(protocol.transactions(), 2);
    }

    #[test]
    fn test_read_burst_uses_auto_increment() {
        let mut bus = RecordingBus::default();
        bus.replies
            .push_back(vec![0x00, 0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x40]);
        let mut protocol = RegisterProtocol::new(bus);

        let mut frame = [0u8; SAMPLE_BURST_LEN];
        protocol.read_burst(ADDR_STATUS_A, &mut frame).unwrap();

        assert_eq!(frame, [0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x40]);
        let sent = &protocol.bus_mut().sent;
        assert_eq!(sent.len(), 1, "burst must be a single transaction");
        assert_eq!(sent[0][0], ADDR_STATUS_A | DIR_READ | ADDR_INCREMENT);
        assert_eq!(sent[0].len(), SAMPLE_BURST_LEN + 1);
    }

    #[test]
    fn test_transport_failure_propagates() {
        let bus = RecordingBus {
            fail: true,
            ..Default::default()
        };
        let mut protocol = RegisterProtocol::new(bus);

        assert!(matches!(
            protocol.read_register(ADDR_WHO_AM_I),
            Err(Lsm303dError::CommunicationError(_))
        ));
        // No retry
        assert_eq!(protocol.bus_mut().sent.len(), 1);
    }

    #[test]
    fn test_rejects_addresses_outside_map() {
        let mut protocol = RegisterProtocol::new(RecordingBus::default());
        assert!(matches!(
            protocol.write_register(0x40, 0),
            Err(Lsm303dError::InvalidParameter(_))
        ));
        let mut long = [0u8; 4];
        assert!(protocol.read_burst(0x3E, &mut long).is_err());
        assert!(protocol.bus_mut().sent.is_empty());
    }
}

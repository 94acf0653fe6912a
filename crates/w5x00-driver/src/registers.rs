//! Typed register access on top of a [`ChipBackend`]
//!
//! Blanket extension trait: every backend gets big-endian 16-bit access,
//! socket-relative addressing, the command handshake, the soft-reset
//! handshake and debounced counter reads. None of these begin a transaction;
//! callers hold a [`crate::Transaction`] around them.

use crate::backend::ChipBackend;
use crate::capabilities::LinkStatus;
use crate::clock::Clock;
use crate::error::{Result, W5x00Error};
use std::time::Duration;
use tracing::{debug, trace, warn};
use w5x00_chip::regs::{self, mode, sn};
use w5x00_chip::{SocketCommand, SocketStatus};

/// Polls of `MR` after requesting a soft reset
pub const RESET_POLL_ATTEMPTS: u32 = 20;

/// Delay between reset polls
pub const RESET_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Reads of a free-running counter before giving up on it settling
pub const DEBOUNCE_READ_LIMIT: u32 = 64;

/// Register access helpers available on every backend
pub trait Registers: ChipBackend {
    /// Read one byte
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_u8(&mut self, addr: u16) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(addr, &mut byte)?;
        Ok(byte[0])
    }

    /// Write one byte
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_u8(&mut self, addr: u16, value: u8) -> Result<()> {
        self.write(addr, &[value])
    }

    /// Read a big-endian 16-bit register pair
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_u16(&mut self, addr: u16) -> Result<u16> {
        let mut pair = [0u8; 2];
        self.read(addr, &mut pair)?;
        Ok(u16::from_be_bytes(pair))
    }

    /// Write a big-endian 16-bit register pair
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_u16(&mut self, addr: u16, value: u16) -> Result<()> {
        self.write(addr, &value.to_be_bytes())
    }

    /// Address of socket register `offset` for `socket`
    fn socket_reg(&self, socket: u8, offset: u16) -> u16 {
        regs::socket_register(self.socket_register_base(), socket, offset)
    }

    /// Read socket register `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_sn_u8(&mut self, socket: u8, offset: u16) -> Result<u8> {
        let addr = self.socket_reg(socket, offset);
        self.read_u8(addr)
    }

    /// Write socket register `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_sn_u8(&mut self, socket: u8, offset: u16, value: u8) -> Result<()> {
        let addr = self.socket_reg(socket, offset);
        self.write_u8(addr, value)
    }

    /// Read the 16-bit socket register pair at `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_sn_u16(&mut self, socket: u8, offset: u16) -> Result<u16> {
        let addr = self.socket_reg(socket, offset);
        self.read_u16(addr)
    }

    /// Write the 16-bit socket register pair at `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_sn_u16(&mut self, socket: u8, offset: u16, value: u16) -> Result<()> {
        let addr = self.socket_reg(socket, offset);
        self.write_u16(addr, value)
    }

    /// Read a multi-byte socket register (addresses, MAC)
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_sn_bytes(&mut self, socket: u8, offset: u16, buf: &mut [u8]) -> Result<()> {
        let addr = self.socket_reg(socket, offset);
        self.read(addr, buf)
    }

    /// Write a multi-byte socket register (addresses, MAC)
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_sn_bytes(&mut self, socket: u8, offset: u16, data: &[u8]) -> Result<()> {
        let addr = self.socket_reg(socket, offset);
        self.write(addr, data)
    }

    /// Current `Sn_SR`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn socket_status(&mut self, socket: u8) -> Result<SocketStatus> {
        Ok(SocketStatus::from_raw(self.read_sn_u8(socket, sn::SR)?))
    }

    /// Issue a socket command and wait for the chip to accept it
    ///
    /// # Errors
    ///
    /// Returns [`W5x00Error::CommandTimeout`] if `Sn_CR` is still non-zero
    /// after `poll_limit` reads.
    fn exec_socket_command(
        &mut self,
        socket: u8,
        command: SocketCommand,
        poll_limit: u32,
    ) -> Result<()> {
        trace!("Socket {socket}: {command:?}");
        self.write_sn_u8(socket, sn::CR, command as u8)?;
        for _ in 0..poll_limit {
            if self.read_sn_u8(socket, sn::CR)? == 0 {
                return Ok(());
            }
        }
        warn!("Socket {socket}: {command:?} still pending after {poll_limit} polls");
        Err(W5x00Error::CommandTimeout {
            socket,
            command: command as u8,
            polls: poll_limit,
        })
    }

    /// Soft-reset handshake: set `MR.RST`, wait for the chip to clear it
    ///
    /// # Errors
    ///
    /// [`W5x00Error::ChipBusy`] if MR still shows the reset bit,
    /// [`W5x00Error::ChipNotPresent`] for any other non-zero value (an
    /// undriven bus reads `0xFF`).
    fn soft_reset(&mut self, clock: &mut dyn Clock) -> Result<()> {
        self.write_u8(regs::MR, mode::RESET)?;
        let mut last = mode::RESET;
        for attempt in 1..=RESET_POLL_ATTEMPTS {
            last = self.read_u8(regs::MR)?;
            if last == 0 {
                debug!("{} reset complete after {attempt} polls", self.variant());
                return Ok(());
            }
            clock.delay(RESET_POLL_INTERVAL);
        }

        let variant = self.variant();
        if last != 0xFF && last & mode::RESET != 0 {
            Err(W5x00Error::ChipBusy {
                variant,
                attempts: RESET_POLL_ATTEMPTS,
            })
        } else {
            Err(W5x00Error::ChipNotPresent {
                variant,
                mode_register: last,
            })
        }
    }

    /// Program `Sn_RXBUF_SIZE` / `Sn_TXBUF_SIZE` for all eight slots
    ///
    /// Active sockets get the configured ring size; the rest get zero so the
    /// whole buffer memory goes to the active ones.
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn program_socket_buffers(&mut self) -> Result<()> {
        let caps = *self.capabilities();
        let kib = caps.buffer_size_kib();
        for socket in 0..caps.variant.max_sockets() {
            let size = if socket < caps.socket_count { kib } else { 0 };
            self.write_sn_u8(socket, sn::RXBUF_SIZE, size)?;
            self.write_sn_u8(socket, sn::TXBUF_SIZE, size)?;
        }
        Ok(())
    }

    /// Read a 16-bit counter until two consecutive reads agree
    ///
    /// The chip updates these registers asynchronously, so a single read can
    /// tear between the two bytes.
    ///
    /// # Errors
    ///
    /// Returns [`W5x00Error::UnstableCounter`] after
    /// [`DEBOUNCE_READ_LIMIT`] reads without two matching.
    fn read_counter_debounced(
        &mut self,
        socket: u8,
        offset: u16,
        register: &'static str,
    ) -> Result<u16> {
        let addr = self.socket_reg(socket, offset);
        let mut previous = self.read_u16(addr)?;
        for _ in 1..DEBOUNCE_READ_LIMIT {
            let value = self.read_u16(addr)?;
            if value == previous {
                return Ok(value);
            }
            previous = value;
        }
        Err(W5x00Error::UnstableCounter {
            socket,
            register,
            reads: DEBOUNCE_READ_LIMIT,
        })
    }

    /// Debounced `Sn_TX_FSR`
    ///
    /// # Errors
    ///
    /// See [`Registers::read_counter_debounced`].
    fn tx_free(&mut self, socket: u8) -> Result<u16> {
        self.read_counter_debounced(socket, sn::TX_FSR, "Sn_TX_FSR")
    }

    /// Debounced `Sn_RX_RSR`
    ///
    /// # Errors
    ///
    /// See [`Registers::read_counter_debounced`].
    fn rx_received(&mut self, socket: u8) -> Result<u16> {
        self.read_counter_debounced(socket, sn::RX_RSR, "Sn_RX_RSR")
    }

    /// Sample a PHY link bit
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_link_bit(&mut self, addr: u16, mask: u8) -> Result<LinkStatus> {
        let value = self.read_u8(addr)?;
        Ok(if value & mask != 0 {
            LinkStatus::On
        } else {
            LinkStatus::Off
        })
    }
}

impl<T: ChipBackend + ?Sized> Registers for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Transaction;
    use crate::backends::{Presence, SoftwareBus, W5200, W5500};
    use crate::clock::ManualClock;
    use w5x00_chip::ChipVariant;

    #[test]
    fn reset_distinguishes_busy_from_absent() {
        let mut clock = ManualClock::default();

        let bus = SoftwareBus::new(ChipVariant::W5500).with_presence(Presence::StuckInReset);
        let mut chip = W5500::new(bus, 8);
        let err = Transaction::begin(&mut chip).unwrap().soft_reset(&mut clock).unwrap_err();
        assert!(matches!(err, W5x00Error::ChipBusy { attempts: 20, .. }), "{err}");

        let bus = SoftwareBus::new(ChipVariant::W5500).with_presence(Presence::Absent);
        let mut chip = W5500::new(bus, 8);
        let err = Transaction::begin(&mut chip).unwrap().soft_reset(&mut clock).unwrap_err();
        assert!(matches!(
            err,
            W5x00Error::ChipNotPresent { mode_register: 0xFF, .. }
        ));
        assert!(err.is_init_failure());
    }

    #[test]
    fn reset_waits_for_bit_to_clear() {
        let mut clock = ManualClock::default();
        let bus = SoftwareBus::new(ChipVariant::W5200).with_reset_polls(5);
        let mut chip = W5200::new(bus, 8);
        Transaction::begin(&mut chip).unwrap().soft_reset(&mut clock).unwrap();
        // five polls saw the bit, each followed by a 1 ms wait
        assert_eq!(clock.now(), RESET_POLL_INTERVAL * 5);
    }

    #[test]
    fn stuck_command_register_times_out() {
        let bus = SoftwareBus::new(ChipVariant::W5500).with_presence(Presence::Absent);
        let mut chip = W5500::new(bus, 8);
        let err = Transaction::begin(&mut chip)
            .unwrap()
            .exec_socket_command(2, SocketCommand::Open, 5)
            .unwrap_err();
        assert!(matches!(
            err,
            W5x00Error::CommandTimeout { socket: 2, command: 0x01, polls: 5 }
        ));
    }

    #[test]
    fn debounce_settles_after_jitter() {
        let mut bus = SoftwareBus::new(ChipVariant::W5500);
        bus.set_counter_jitter(10);
        let mut chip = W5500::new(bus, 8);
        let free = Transaction::begin(&mut chip).unwrap().tx_free(0).unwrap();
        assert_eq!(free, 2048);
    }

    #[test]
    fn debounce_gives_up_on_a_moving_counter() {
        let mut bus = SoftwareBus::new(ChipVariant::W5500);
        bus.set_counter_jitter(1000);
        let mut chip = W5500::new(bus, 8);
        let err = Transaction::begin(&mut chip).unwrap().rx_received(3).unwrap_err();
        assert!(matches!(
            err,
            W5x00Error::UnstableCounter { socket: 3, reads: DEBOUNCE_READ_LIMIT, .. }
        ));
    }

    #[test]
    fn sixteen_bit_access_is_big_endian() {
        let mut chip = W5500::new(SoftwareBus::new(ChipVariant::W5500), 8);
        let mut tx = Transaction::begin(&mut chip).unwrap();
        tx.write_sn_u16(1, sn::PORT, 0x1F90).unwrap();
        assert_eq!(tx.read_sn_u16(1, sn::PORT).unwrap(), 0x1F90);
        assert_eq!(tx.read_sn_u8(1, sn::PORT).unwrap(), 0x1F);
    }
}

//! W5200 backend
//!
//! Burst frames: `[addr_hi, addr_lo, rw | len_hi, len_lo]` then `len` data
//! bytes. The length field is 15 bits, so longer transfers are split.

use crate::backend::{ChipBackend, Transaction};
use crate::bus::{Payload, SpiBus};
use crate::capabilities::{Capabilities, LinkStatus};
use crate::clock::Clock;
use crate::error::Result;
use crate::registers::Registers;
use std::fmt::Debug;
use tracing::info;
use w5x00_chip::frame::{w5200, Direction};
use w5x00_chip::ChipVariant;

use super::RESET_SETTLE;

/// W5200 over a burst-framed SPI bus
#[derive(Debug)]
pub struct W5200<B> {
    bus: B,
    caps: Capabilities,
    initialized: bool,
}

impl<B: SpiBus> W5200<B> {
    /// Backend for `sockets` sockets (clamped to 1..=8)
    pub fn new(bus: B, sockets: u8) -> Self {
        Self {
            bus,
            caps: Capabilities::for_variant(ChipVariant::W5200, sockets),
            initialized: false,
        }
    }

    /// Underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Underlying bus, mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the bus back
    pub fn into_bus(self) -> B {
        self.bus
    }
}

impl<B: SpiBus + Debug> ChipBackend for W5200<B> {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn init(&mut self, clock: &mut dyn Clock) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        clock.delay(RESET_SETTLE);
        {
            let mut tx = Transaction::begin(self)?;
            tx.soft_reset(clock)?;
            tx.program_socket_buffers()?;
        }
        self.initialized = true;
        info!(
            "W5200 ready: {} sockets, {} KiB rings",
            self.caps.socket_count,
            self.caps.buffer_size_kib()
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.bus.begin_transaction()
    }

    fn end_transaction(&mut self) {
        self.bus.end_transaction();
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let mut at = addr;
        for chunk in buf.chunks_mut(w5200::MAX_BURST) {
            let len = chunk.len() as u16;
            let header = w5200::header(Direction::Read, at, len);
            self.bus.frame(&header, Payload::Read(chunk))?;
            at = at.wrapping_add(len);
        }
        Ok(())
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let mut at = addr;
        for chunk in data.chunks(w5200::MAX_BURST) {
            let len = chunk.len() as u16;
            let header = w5200::header(Direction::Write, at, len);
            self.bus.frame(&header, Payload::Write(chunk))?;
            at = at.wrapping_add(len);
        }
        Ok(())
    }

    fn tx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5200.tx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn rx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5200.rx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn has_offset_address_mapping(&self) -> bool {
        false
    }

    fn link_status(&mut self, clock: &mut dyn Clock) -> Result<LinkStatus> {
        super::sample_link(self, clock)
    }
}

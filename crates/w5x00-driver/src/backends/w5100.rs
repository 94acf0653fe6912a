//! W5100 backend
//!
//! One frame per byte: `[0xF0 | 0x0F, addr_hi, addr_lo]` followed by a single
//! data byte. Ring sizes live in the shared `TMSR` / `RMSR` maps.

use crate::backend::{ChipBackend, Transaction};
use crate::bus::{Payload, SpiBus};
use crate::capabilities::{Capabilities, LinkStatus};
use crate::clock::Clock;
use crate::error::Result;
use crate::registers::Registers;
use std::fmt::Debug;
use tracing::info;
use w5x00_chip::frame::{w5100, Direction};
use w5x00_chip::regs;
use w5x00_chip::ChipVariant;

use super::RESET_SETTLE;

/// W5100 over a byte-framed SPI bus
#[derive(Debug)]
pub struct W5100<B> {
    bus: B,
    caps: Capabilities,
    initialized: bool,
}

impl<B: SpiBus> W5100<B> {
    /// Backend for `sockets` sockets (clamped to 1..=4)
    pub fn new(bus: B, sockets: u8) -> Self {
        Self {
            bus,
            caps: Capabilities::for_variant(ChipVariant::W5100, sockets),
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

impl<B: SpiBus + Debug> ChipBackend for W5100<B> {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn init(&mut self, clock: &mut dyn Clock) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        clock.delay(RESET_SETTLE);

        let size_map = ChipVariant::w5100_size_map(self.caps.buffer_size);
        {
            let mut tx = Transaction::begin(self)?;
            tx.soft_reset(clock)?;
            tx.write_u8(regs::TMSR, size_map)?;
            tx.write_u8(regs::RMSR, size_map)?;
        }

        self.initialized = true;
        info!(
            "W5100 ready: {} sockets, {} byte rings (size map {size_map:#04x})",
            self.caps.socket_count, self.caps.buffer_size
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
        for (i, byte) in buf.iter_mut().enumerate() {
            let header = w5100::header(Direction::Read, addr.wrapping_add(i as u16));
            self.bus
                .frame(&header, Payload::Read(std::slice::from_mut(byte)))?;
        }
        Ok(())
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            let header = w5100::header(Direction::Write, addr.wrapping_add(i as u16));
            self.bus
                .frame(&header, Payload::Write(std::slice::from_ref(byte)))?;
        }
        Ok(())
    }

    fn tx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5100.tx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn rx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5100.rx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn has_offset_address_mapping(&self) -> bool {
        false
    }

    fn link_status(&mut self, _clock: &mut dyn Clock) -> Result<LinkStatus> {
        // No PHY status register on this part
        Ok(LinkStatus::Unknown)
    }
}

//! W5500 backend
//!
//! Frames carry a block select instead of a flat address:
//! `[offset_hi, offset_lo, bsb << 3 | rw]`. The driver keeps using the flat
//! logical map (socket registers at `0x1000`, rings at `0x8000` / `0xC000`);
//! this backend translates each access into its block. Ring offsets are taken
//! modulo the ring size by the chip, so reads and writes never need to be
//! split at the wrap point.

use crate::backend::{ChipBackend, Transaction};
use crate::bus::{Payload, SpiBus};
use crate::capabilities::{Capabilities, LinkStatus};
use crate::clock::Clock;
use crate::error::Result;
use crate::registers::Registers;
use std::fmt::Debug;
use tracing::info;
use w5x00_chip::frame::{w5500, Direction};
use w5x00_chip::ChipVariant;

use super::RESET_SETTLE;

/// W5500 over a block-select SPI bus
#[derive(Debug)]
pub struct W5500<B> {
    bus: B,
    caps: Capabilities,
    initialized: bool,
}

impl<B: SpiBus> W5500<B> {
    /// Backend for `sockets` sockets (clamped to 1..=8)
    pub fn new(bus: B, sockets: u8) -> Self {
        Self {
            bus,
            caps: Capabilities::for_variant(ChipVariant::W5500, sockets),
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

impl<B: SpiBus + Debug> ChipBackend for W5500<B> {
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
            "W5500 ready: {} sockets, {} KiB rings",
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
        let header = w5500::header(Direction::Read, addr, self.caps.buffer_size);
        self.bus.frame(&header, Payload::Read(buf))
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let header = w5500::header(Direction::Write, addr, self.caps.buffer_size);
        self.bus.frame(&header, Payload::Write(data))
    }

    fn tx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5500.tx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn rx_base(&self, socket: u8) -> u16 {
        ChipVariant::W5500.rx_region() + u16::from(socket) * self.caps.buffer_size
    }

    fn has_offset_address_mapping(&self) -> bool {
        true
    }

    fn link_status(&mut self, clock: &mut dyn Clock) -> Result<LinkStatus> {
        super::sample_link(self, clock)
    }
}

//! Backend abstraction for W5x00 chip variants
//!
//! One interface over three register maps. A backend owns the bus, knows its
//! variant's framing and address layout, and exposes raw addressed reads and
//! writes. Everything above it (registers, sockets, rings) is variant-agnostic.

use crate::bus::SpiBus;
use crate::capabilities::{Capabilities, LinkStatus};
use crate::clock::Clock;
use crate::error::Result;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use w5x00_chip::ChipVariant;

/// Chip backend - unified interface for W5100, W5200 and W5500
pub trait ChipBackend: Debug {
    /// Capability descriptor fixed at construction
    fn capabilities(&self) -> &Capabilities;

    /// Chip family member
    fn variant(&self) -> ChipVariant {
        self.capabilities().variant
    }

    /// Soft-reset the chip and program ring sizes
    ///
    /// Idempotent: returns immediately once a previous init succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::W5x00Error::ChipNotPresent`] or
    /// [`crate::W5x00Error::ChipBusy`] if the reset handshake never settles,
    /// or a bus error.
    fn init(&mut self, clock: &mut dyn Clock) -> Result<()>;

    /// Whether init has succeeded
    fn is_initialized(&self) -> bool;

    /// Take exclusive use of the bus
    ///
    /// # Errors
    ///
    /// Returns error if the bus cannot be acquired.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Release the bus
    fn end_transaction(&mut self);

    /// Read `buf.len()` bytes starting at logical address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at logical address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()>;

    /// Base of the first socket register block
    fn socket_register_base(&self) -> u16 {
        self.variant().socket_register_base()
    }

    /// Start of socket `socket`'s TX ring
    fn tx_base(&self, socket: u8) -> u16;

    /// Start of socket `socket`'s RX ring
    fn rx_base(&self, socket: u8) -> u16;

    /// Whether ring wraparound is resolved by the bus protocol
    fn has_offset_address_mapping(&self) -> bool;

    /// PHY link state, initialising the chip first if needed
    ///
    /// # Errors
    ///
    /// Returns error if the PHY register cannot be read.
    fn link_status(&mut self, clock: &mut dyn Clock) -> Result<LinkStatus>;
}

impl<T: ChipBackend + ?Sized> ChipBackend for Box<T> {
    fn capabilities(&self) -> &Capabilities {
        (**self).capabilities()
    }

    fn variant(&self) -> ChipVariant {
        (**self).variant()
    }

    fn init(&mut self, clock: &mut dyn Clock) -> Result<()> {
        (**self).init(clock)
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn begin_transaction(&mut self) -> Result<()> {
        (**self).begin_transaction()
    }

    fn end_transaction(&mut self) {
        (**self).end_transaction();
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn socket_register_base(&self) -> u16 {
        (**self).socket_register_base()
    }

    fn tx_base(&self, socket: u8) -> u16 {
        (**self).tx_base(socket)
    }

    fn rx_base(&self, socket: u8) -> u16 {
        (**self).rx_base(socket)
    }

    fn has_offset_address_mapping(&self) -> bool {
        (**self).has_offset_address_mapping()
    }

    fn link_status(&mut self, clock: &mut dyn Clock) -> Result<LinkStatus> {
        (**self).link_status(clock)
    }
}

/// Scoped bus ownership
///
/// Begins a transaction on creation and ends it on drop, so every exit path
/// (including `?`) releases the bus. Derefs to the backend.
#[derive(Debug)]
pub struct Transaction<'a, C: ChipBackend + ?Sized> {
    chip: &'a mut C,
}

impl<'a, C: ChipBackend + ?Sized> Transaction<'a, C> {
    /// Acquire the bus for the lifetime of the returned guard
    ///
    /// # Errors
    ///
    /// Returns error if the bus cannot be acquired.
    pub fn begin(chip: &'a mut C) -> Result<Self> {
        chip.begin_transaction()?;
        Ok(Self { chip })
    }
}

impl<C: ChipBackend + ?Sized> Deref for Transaction<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.chip
    }
}

impl<C: ChipBackend + ?Sized> DerefMut for Transaction<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.chip
    }
}

impl<C: ChipBackend + ?Sized> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        self.chip.end_transaction();
    }
}

/// Build the backend for `variant` on `bus`, sized for `sockets` sockets
///
/// The chip is not touched until [`ChipBackend::init`].
pub fn select_backend<B: SpiBus + Debug + 'static>(
    variant: ChipVariant,
    bus: B,
    sockets: u8,
) -> Box<dyn ChipBackend> {
    use crate::backends::{W5100, W5200, W5500};

    let backend: Box<dyn ChipBackend> = match variant {
        ChipVariant::W5100 => Box::new(W5100::new(bus, sockets)),
        ChipVariant::W5200 => Box::new(W5200::new(bus, sockets)),
        ChipVariant::W5500 => Box::new(W5500::new(bus, sockets)),
    };
    let caps = backend.capabilities();
    tracing::debug!(
        "Selected {variant} backend: {} sockets x {} bytes",
        caps.socket_count,
        caps.buffer_size
    );
    backend
}

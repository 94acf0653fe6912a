//! Byte-level bus contract
//!
//! The chip backends only need two things from the host: exclusive ownership
//! of the bus for the span of a transaction, and chip-select framed
//! exchanges. Everything addressed (headers, bursts, block selects) is built
//! on top of [`SpiBus::frame`] by the backend for its variant.

use crate::error::Result;

/// Data phase of a framed exchange.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Clock these bytes out after the header.
    Write(&'a [u8]),
    /// Clock bytes in after the header, filling the buffer.
    Read(&'a mut [u8]),
}

impl Payload<'_> {
    /// Number of data bytes in this phase.
    pub fn len(&self) -> usize {
        match self {
            Self::Write(data) => data.len(),
            Self::Read(buf) => buf.len(),
        }
    }

    /// Whether the data phase is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host side of the SPI link to the chip.
///
/// `begin_transaction` / `end_transaction` bracket exclusive use of the bus
/// (clock settings, arbitration with other devices). Callers never invoke
/// them directly; [`crate::Transaction`] does it and guarantees the release.
pub trait SpiBus {
    /// Take ownership of the bus.
    ///
    /// # Errors
    ///
    /// Returns error if the bus cannot be acquired.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Release the bus.
    fn end_transaction(&mut self);

    /// One chip-select framed exchange: assert CS, shift `header` out, run
    /// the data phase, deassert CS.
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn frame(&mut self, header: &[u8], payload: Payload<'_>) -> Result<()>;
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn begin_transaction(&mut self) -> Result<()> {
        (**self).begin_transaction()
    }

    fn end_transaction(&mut self) {
        (**self).end_transaction();
    }

    fn frame(&mut self, header: &[u8], payload: Payload<'_>) -> Result<()> {
        (**self).frame(header, payload)
    }
}

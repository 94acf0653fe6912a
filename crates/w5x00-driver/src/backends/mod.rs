//! Chip backend implementations
//!
//! Three hardware backends, one per register map:
//! - **W5100**: per-byte frames, shared `TMSR` / `RMSR` size maps
//! - **W5200**: length-prefixed bursts, per-socket size registers
//! - **W5500**: block-select frames, ring wrap resolved by the chip
//!
//! Plus [`SoftwareBus`], a register-level chip model that speaks any of the
//! three framings, for tests and the CLI self-test.

pub mod software;
mod w5100;
mod w5200;
mod w5500;

pub use software::{Datagram, Presence, SoftwareBus};
pub use w5100::W5100;
pub use w5200::W5200;
pub use w5500::W5500;

use crate::backend::{ChipBackend, Transaction};
use crate::capabilities::LinkStatus;
use crate::clock::Clock;
use crate::error::Result;
use crate::registers::Registers;
use std::time::Duration;
use tracing::debug;

/// Settling time after power-up or hardware reset before the first access
pub const RESET_SETTLE: Duration = Duration::from_millis(560);

/// Read the variant's PHY link bit, initialising first
///
/// A chip that fails init reports [`LinkStatus::Unknown`] rather than an
/// error.
pub(crate) fn sample_link<C: ChipBackend>(chip: &mut C, clock: &mut dyn Clock) -> Result<LinkStatus> {
    let Some((addr, mask)) = chip.variant().phy_link() else {
        return Ok(LinkStatus::Unknown);
    };
    if let Err(e) = chip.init(clock) {
        debug!("Link status unavailable: {e}");
        return Ok(LinkStatus::Unknown);
    }
    let mut tx = Transaction::begin(chip)?;
    tx.read_link_bit(addr, mask)
}

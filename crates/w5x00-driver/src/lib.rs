//! Socket driver for WIZnet W5100 / W5200 / W5500 TCP/IP offload chips.
//!
//! The chip runs the TCP/IP stack; this crate manages its hardware sockets
//! and moves payload through the per-socket ring buffers over SPI.
//!
//! # Layers
//!
//! ```text
//! SocketDriver        allocation, connect/listen/close, send/recv, UDP
//!   └─ Registers      typed register access, command + reset handshakes
//!       └─ ChipBackend   W5100 | W5200 | W5500 (framing, address layout)
//!           └─ SpiBus    host SPI (or SoftwareBus for tests)
//! ```
//!
//! # Quick start
//!
//! ```
//! use std::net::Ipv4Addr;
//! use w5x00_driver::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SoftwareBus::new(ChipVariant::W5500);
//! let mut drv = SocketDriver::new(W5500::new(bus, 4), ManualClock::default(), DriverConfig::default())?;
//! drv.configure(&NetConfig::new([0x02, 0, 0, 0, 0, 1], Ipv4Addr::new(192, 168, 1, 50)))?;
//!
//! let sock = drv.begin(SocketMode::TCP, 0)?;
//! if drv.connect(sock, Ipv4Addr::new(192, 168, 1, 10), 80)? {
//!     drv.send(sock, b"GET / HTTP/1.0\r\n\r\n")?;
//! }
//! drv.stop(sock)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Ring sizes
//!
//! | Sockets | W5100 | W5200 / W5500 |
//! |---------|-------|---------------|
//! | 1 | 8 KiB | 16 KiB |
//! | 2 | 4 KiB | 8 KiB |
//! | 3-4 | 2 KiB | 4 KiB |
//! | 5-8 | - | 2 KiB |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

mod backend;
pub mod backends;
mod bus;
mod capabilities;
mod clock;
mod config;
mod error;
mod netif;
mod ports;
pub mod registers;
mod ring;
mod socket;

pub use backend::{select_backend, ChipBackend, Transaction};
pub use bus::{Payload, SpiBus};
pub use capabilities::{Capabilities, LinkStatus};
pub use clock::{Clock, ManualClock, StdClock};
pub use config::{DriverConfig, NetConfig};
pub use error::{Result, W5x00Error};
pub use netif::MAX_RETRANSMISSION_TIMEOUT_MS;
pub use ports::{EphemeralPorts, EPHEMERAL_START};
pub use ring::ACK_THRESHOLD;
pub use socket::{multicast_mac, Received, SocketDriver, SocketId, SocketSlot};

/// Chip model types (re-exported from w5x00-chip).
pub use w5x00_chip::{ChipVariant, SocketCommand, SocketMode, SocketStatus};

/// Everything needed to open sockets against a chip or the software model.
pub mod prelude {
    pub use crate::backends::{SoftwareBus, W5100, W5200, W5500};
    pub use crate::{
        select_backend, ChipBackend, ChipVariant, Clock, DriverConfig, LinkStatus, ManualClock,
        NetConfig, Received, SocketDriver, SocketId, SocketMode, SocketStatus, SpiBus, StdClock,
        W5x00Error,
    };
}

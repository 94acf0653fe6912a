//! Silicon model for WIZnet W5100 / W5200 / W5500 TCP/IP offload chips.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon: register addresses, socket state codes,
//! per-variant buffer layout, and the SPI frame format each chip speaks.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Common and per-socket register offsets, bit definitions |
//! | [`socket`] | Socket status, mode and command codes |
//! | [`variant`] | Chip variants, address layout, buffer sizing |
//! | [`frame`] | SPI frame headers (encode and decode) per variant |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod frame;
pub mod regs;
pub mod socket;
pub mod variant;

pub use socket::{SocketCommand, SocketMode, SocketStatus};
pub use variant::ChipVariant;

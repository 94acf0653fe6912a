//! Chip capability descriptor
//!
//! Socket count and ring size are chosen once, when the backend is built,
//! from the number of sockets the application asks for. After a successful
//! init they never change; the driver sizes its slot table from them.

use w5x00_chip::ChipVariant;

/// What the initialised chip offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Chip family member
    pub variant: ChipVariant,

    /// Hardware sockets in use (1..=variant maximum)
    pub socket_count: u8,

    /// Per-socket TX and RX ring size in bytes (power of two)
    pub buffer_size: u16,

    /// Whether the bus resolves ring wraparound itself
    pub offset_addressing: bool,
}

impl Capabilities {
    /// Descriptor for `variant` serving `requested_sockets` sockets.
    ///
    /// The count is clamped to 1..=`variant.max_sockets()`; ring size
    /// follows from the clamped count.
    pub const fn for_variant(variant: ChipVariant, requested_sockets: u8) -> Self {
        let socket_count = variant.clamp_sockets(requested_sockets);
        Self {
            variant,
            socket_count,
            buffer_size: variant.buffer_size_for(socket_count),
            offset_addressing: variant.offset_addressing(),
        }
    }

    /// Mask applied to a free-running pointer to get a ring offset.
    pub const fn buffer_mask(&self) -> u16 {
        self.buffer_size - 1
    }

    /// Ring size in KiB as written to `Sn_RXBUF_SIZE` / `Sn_TXBUF_SIZE`.
    pub const fn buffer_size_kib(&self) -> u8 {
        (self.buffer_size >> 10) as u8
    }
}

/// Ethernet PHY link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Chip cannot report link, or init failed
    Unknown,
    /// Cable connected, link up
    On,
    /// No link
    Off,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::On => write!(f, "up"),
            Self::Off => write!(f, "down"),
        }
    }
}

//! Chip variants and their address layout.
//!
//! ```text
//! Variant  Sockets  Socket regs  TX rings  RX rings  Offset addressing
//! ───────  ───────  ───────────  ────────  ────────  ─────────────────
//! W5100    4        0x0400       0x4000    0x6000    no
//! W5200    8        0x4000       0x8000    0xC000    no
//! W5500    8        0x1000 (*)   0x8000    0xC000    yes
//! ```
//!
//! (*) The W5500 has no flat address space; the driver uses these logical
//! addresses and [`crate::frame`] turns them into block-select codes.
//!
//! Ring size per socket is fixed at init from the number of sockets in use:
//! fewer sockets, bigger rings.

use crate::regs;

/// W5x00 family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipVariant {
    /// W5100: 4 sockets, 8 KiB TX + 8 KiB RX shared, byte-per-frame SPI.
    W5100,
    /// W5200: 8 sockets, 16 KiB TX + 16 KiB RX shared, burst SPI.
    W5200,
    /// W5500: 8 sockets, 16 KiB TX + 16 KiB RX shared, block-select SPI.
    W5500,
}

impl ChipVariant {
    /// All supported variants.
    pub const ALL: [Self; 3] = [Self::W5100, Self::W5200, Self::W5500];

    /// Hardware socket count.
    #[must_use]
    pub const fn max_sockets(self) -> u8 {
        match self {
            Self::W5100 => 4,
            Self::W5200 | Self::W5500 => 8,
        }
    }

    /// Clamp a requested socket count to what the chip provides (at least 1).
    #[must_use]
    pub const fn clamp_sockets(self, requested: u8) -> u8 {
        let max = self.max_sockets();
        if requested == 0 {
            1
        } else if requested > max {
            max
        } else {
            requested
        }
    }

    /// Per-socket ring size in bytes when `sockets` sockets are in use.
    #[must_use]
    pub const fn buffer_size_for(self, sockets: u8) -> u16 {
        match self {
            Self::W5100 => match sockets {
                0 | 1 => 8192,
                2 => 4096,
                _ => 2048,
            },
            Self::W5200 | Self::W5500 => match sockets {
                0 | 1 => 16384,
                2 => 8192,
                3 | 4 => 4096,
                _ => 2048,
            },
        }
    }

    /// W5100 `TMSR`/`RMSR` value for a ring size (2 bits per socket).
    #[must_use]
    pub const fn w5100_size_map(buffer_size: u16) -> u8 {
        match buffer_size {
            8192 => 0x03,
            4096 => 0x0A,
            _ => 0x55,
        }
    }

    /// Base of the first socket register block.
    #[must_use]
    pub const fn socket_register_base(self) -> u16 {
        match self {
            Self::W5100 => 0x0400,
            Self::W5200 => 0x4000,
            Self::W5500 => 0x1000,
        }
    }

    /// Start of the TX ring region.
    #[must_use]
    pub const fn tx_region(self) -> u16 {
        match self {
            Self::W5100 => 0x4000,
            Self::W5200 | Self::W5500 => 0x8000,
        }
    }

    /// Start of the RX ring region.
    #[must_use]
    pub const fn rx_region(self) -> u16 {
        match self {
            Self::W5100 => 0x6000,
            Self::W5200 | Self::W5500 => 0xC000,
        }
    }

    /// Whether the bus resolves ring wraparound from a logical offset.
    #[must_use]
    pub const fn offset_addressing(self) -> bool {
        matches!(self, Self::W5500)
    }

    /// Retransmission time register (2 bytes, 100 µs units).
    #[must_use]
    pub const fn rtr(self) -> u16 {
        match self {
            Self::W5100 | Self::W5200 => 0x0017,
            Self::W5500 => 0x0019,
        }
    }

    /// Retransmission count register.
    #[must_use]
    pub const fn rcr(self) -> u16 {
        match self {
            Self::W5100 | Self::W5200 => 0x0019,
            Self::W5500 => 0x001B,
        }
    }

    /// PHY status register and link bit, if the chip exposes one.
    #[must_use]
    pub const fn phy_link(self) -> Option<(u16, u8)> {
        match self {
            Self::W5100 => None,
            Self::W5200 => Some((regs::PSTATUS_W5200, regs::phy::W5200_LINK)),
            Self::W5500 => Some((regs::PHYCFGR_W5500, regs::phy::W5500_LINK)),
        }
    }

    /// Marketing name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::W5100 => "W5100",
            Self::W5200 => "W5200",
            Self::W5500 => "W5500",
        }
    }
}

impl std::fmt::Display for ChipVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ChipVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w5100" | "5100" => Ok(Self::W5100),
            "w5200" | "5200" => Ok(Self::W5200),
            "w5500" | "5500" => Ok(Self::W5500),
            other => Err(format!("unknown chip variant: {other}")),
        }
    }
}

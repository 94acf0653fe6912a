//! Register map shared by the W5x00 family.
//!
//! The common register block sits at the bottom of the address space on all
//! three chips. Socket register blocks repeat every [`SOCKET_STRIDE`] bytes
//! from a variant-specific base (see [`crate::variant`]); the offsets inside
//! a block are identical across the family.
//!
//! ```text
//! 0x0000  MR       mode (bit 7 = soft reset)
//! 0x0001  GAR      gateway address      (4)
//! 0x0005  SUBR     subnet mask          (4)
//! 0x0009  SHAR     source MAC           (6)
//! 0x000F  SIPR     source IP            (4)
//! 0x001A  RMSR     W5100 RX size map
//! 0x001B  TMSR     W5100 TX size map
//! ```

// ── Common registers ─────────────────────────────────────────────────────────

/// Mode register. Writing [`mode::RESET`] starts a soft reset.
pub const MR: u16 = 0x0000;
/// Gateway IP address (4 bytes).
pub const GAR: u16 = 0x0001;
/// Subnet mask (4 bytes).
pub const SUBR: u16 = 0x0005;
/// Source hardware (MAC) address (6 bytes).
pub const SHAR: u16 = 0x0009;
/// Source IP address (4 bytes).
pub const SIPR: u16 = 0x000F;
/// W5100 RX memory size register (2 bits per socket).
pub const RMSR: u16 = 0x001A;
/// W5100 TX memory size register (2 bits per socket).
pub const TMSR: u16 = 0x001B;
/// W5200 PHY status register.
pub const PSTATUS_W5200: u16 = 0x0035;
/// W5500 PHY configuration register.
pub const PHYCFGR_W5500: u16 = 0x002E;
/// W5500 chip version register. Reads `0x04`.
pub const VERSIONR_W5500: u16 = 0x0039;

/// Mode register bits.
pub mod mode {
    /// Soft reset. Self-clearing once the chip has reinitialised.
    pub const RESET: u8 = 0x80;
}

/// PHY link bits.
pub mod phy {
    /// W5200 `PSTATUS` link bit.
    pub const W5200_LINK: u8 = 0x20;
    /// W5500 `PHYCFGR` link bit.
    pub const W5500_LINK: u8 = 0x01;
}

// ── Socket registers (offsets inside a socket block) ─────────────────────────

/// Distance between consecutive socket register blocks.
pub const SOCKET_STRIDE: u16 = 0x0100;

/// Per-socket register offsets.
pub mod sn {
    /// Socket mode.
    pub const MR: u16 = 0x00;
    /// Socket command. Reads 0 once the chip has accepted the command.
    pub const CR: u16 = 0x01;
    /// Socket interrupt flags (write 1 to clear).
    pub const IR: u16 = 0x02;
    /// Socket status.
    pub const SR: u16 = 0x03;
    /// Source port (2).
    pub const PORT: u16 = 0x04;
    /// Destination hardware address (6).
    pub const DHAR: u16 = 0x06;
    /// Destination IP address (4).
    pub const DIPR: u16 = 0x0C;
    /// Destination port (2).
    pub const DPORT: u16 = 0x10;
    /// Maximum segment size (2).
    pub const MSSR: u16 = 0x12;
    /// IP time-to-live.
    pub const TTL: u16 = 0x16;
    /// RX buffer size in KiB (W5200 / W5500).
    pub const RXBUF_SIZE: u16 = 0x1E;
    /// TX buffer size in KiB (W5200 / W5500).
    pub const TXBUF_SIZE: u16 = 0x1F;
    /// TX free size (2), free-running.
    pub const TX_FSR: u16 = 0x20;
    /// TX read pointer (2).
    pub const TX_RD: u16 = 0x22;
    /// TX write pointer (2).
    pub const TX_WR: u16 = 0x24;
    /// RX received size (2), free-running.
    pub const RX_RSR: u16 = 0x26;
    /// RX read pointer (2).
    pub const RX_RD: u16 = 0x28;
    /// RX write pointer (2).
    pub const RX_WR: u16 = 0x2A;
}

/// Socket interrupt register bits.
pub mod sn_ir {
    /// Connection established.
    pub const CON: u8 = 0x01;
    /// FIN received or disconnect complete.
    pub const DISCON: u8 = 0x02;
    /// Data received.
    pub const RECV: u8 = 0x04;
    /// ARP or TCP retransmission timeout.
    pub const TIMEOUT: u8 = 0x08;
    /// SEND command completed.
    pub const SEND_OK: u8 = 0x10;
    /// All flags; written at socket open to clear stale state.
    pub const ALL: u8 = 0xFF;
}

/// Address of register `offset` inside the block of socket `socket`.
#[must_use]
pub const fn socket_register(base: u16, socket: u8, offset: u16) -> u16 {
    base + socket as u16 * SOCKET_STRIDE + offset
}

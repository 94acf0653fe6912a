//! Socket status, mode and command codes.
//!
//! Values are identical across W5100, W5200 and W5500.

/// Value of the `Sn_SR` status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketStatus {
    /// Socket is free.
    Closed,
    /// TCP socket opened, neither listening nor connecting.
    Init,
    /// Waiting for an incoming connection.
    Listen,
    /// SYN sent, waiting for SYN/ACK.
    SynSent,
    /// SYN received, waiting for ACK.
    SynRecv,
    /// Connection established.
    Established,
    /// Local side closed, waiting for peer.
    FinWait,
    /// Both sides closing simultaneously.
    Closing,
    /// Waiting out the 2·MSL timer.
    TimeWait,
    /// Peer closed; local side may still send.
    CloseWait,
    /// Waiting for the final ACK of our FIN.
    LastAck,
    /// UDP socket open.
    Udp,
    /// IP raw socket open.
    IpRaw,
    /// MAC raw socket open.
    MacRaw,
    /// PPPoE socket open.
    Pppoe,
    /// Transitional or undocumented value.
    Other(u8),
}

impl SocketStatus {
    /// Decode a raw `Sn_SR` value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Closed,
            0x13 => Self::Init,
            0x14 => Self::Listen,
            0x15 => Self::SynSent,
            0x16 => Self::SynRecv,
            0x17 => Self::Established,
            0x18 => Self::FinWait,
            0x1A => Self::Closing,
            0x1B => Self::TimeWait,
            0x1C => Self::CloseWait,
            0x1D => Self::LastAck,
            0x22 => Self::Udp,
            0x32 => Self::IpRaw,
            0x42 => Self::MacRaw,
            0x5F => Self::Pppoe,
            other => Self::Other(other),
        }
    }

    /// Raw register value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::Closed => 0x00,
            Self::Init => 0x13,
            Self::Listen => 0x14,
            Self::SynSent => 0x15,
            Self::SynRecv => 0x16,
            Self::Established => 0x17,
            Self::FinWait => 0x18,
            Self::Closing => 0x1A,
            Self::TimeWait => 0x1B,
            Self::CloseWait => 0x1C,
            Self::LastAck => 0x1D,
            Self::Udp => 0x22,
            Self::IpRaw => 0x32,
            Self::MacRaw => 0x42,
            Self::Pppoe => 0x5F,
            Self::Other(raw) => raw,
        }
    }

    /// Terminal TCP states that allocation may forcibly reclaim.
    #[must_use]
    pub const fn is_reclaimable(self) -> bool {
        matches!(
            self,
            Self::LastAck | Self::TimeWait | Self::FinWait | Self::Closing
        )
    }

    /// States in which data may still be sent.
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::Established | Self::CloseWait)
    }

    /// States in which an empty receive buffer means end of stream.
    #[must_use]
    pub const fn is_end_of_stream(self) -> bool {
        matches!(self, Self::Listen | Self::Closed | Self::CloseWait)
    }
}

impl std::fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Init => write!(f, "INIT"),
            Self::Listen => write!(f, "LISTEN"),
            Self::SynSent => write!(f, "SYNSENT"),
            Self::SynRecv => write!(f, "SYNRECV"),
            Self::Established => write!(f, "ESTABLISHED"),
            Self::FinWait => write!(f, "FIN_WAIT"),
            Self::Closing => write!(f, "CLOSING"),
            Self::TimeWait => write!(f, "TIME_WAIT"),
            Self::CloseWait => write!(f, "CLOSE_WAIT"),
            Self::LastAck => write!(f, "LAST_ACK"),
            Self::Udp => write!(f, "UDP"),
            Self::IpRaw => write!(f, "IPRAW"),
            Self::MacRaw => write!(f, "MACRAW"),
            Self::Pppoe => write!(f, "PPPOE"),
            Self::Other(raw) => write!(f, "??? ({raw:#04x})"),
        }
    }
}

/// Value of the `Sn_MR` mode register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketMode(u8);

impl SocketMode {
    /// Socket disabled.
    pub const CLOSE: Self = Self(0x00);
    /// TCP with no-delayed-ACK.
    pub const TCP: Self = Self(0x21);
    /// UDP.
    pub const UDP: Self = Self(0x02);
    /// IP raw.
    pub const IPRAW: Self = Self(0x03);
    /// MAC raw (socket 0 only).
    pub const MACRAW: Self = Self(0x04);
    /// PPPoE (socket 0 only).
    pub const PPPOE: Self = Self(0x05);
    /// No-delayed-ACK flag.
    pub const ND: u8 = 0x20;
    /// Multicast flag (UDP).
    pub const MULTICAST: u8 = 0x80;

    /// Wrap a raw register value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw register value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// This mode with the multicast flag set.
    #[must_use]
    pub const fn multicast(self) -> Self {
        Self(self.0 | Self::MULTICAST)
    }

    /// Protocol bits with the option flags masked off.
    #[must_use]
    pub const fn protocol(self) -> u8 {
        self.0 & 0x0F
    }
}

/// Value written to the `Sn_CR` command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketCommand {
    /// Initialise the socket according to `Sn_MR`.
    Open = 0x01,
    /// Enter LISTEN (TCP server).
    Listen = 0x02,
    /// Send SYN to `Sn_DIPR:Sn_DPORT`.
    Connect = 0x04,
    /// Send FIN.
    Disconnect = 0x08,
    /// Close immediately.
    Close = 0x10,
    /// Transmit `Sn_TX_RD..Sn_TX_WR`.
    Send = 0x20,
    /// UDP send without ARP.
    SendMac = 0x21,
    /// TCP keep-alive.
    SendKeep = 0x22,
    /// Release `Sn_RX_RD` bytes back to the chip.
    Recv = 0x40,
}

impl SocketCommand {
    /// Decode a raw command value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Open),
            0x02 => Some(Self::Listen),
            0x04 => Some(Self::Connect),
            0x08 => Some(Self::Disconnect),
            0x10 => Some(Self::Close),
            0x20 => Some(Self::Send),
            0x21 => Some(Self::SendMac),
            0x22 => Some(Self::SendKeep),
            0x40 => Some(Self::Recv),
            _ => None,
        }
    }
}

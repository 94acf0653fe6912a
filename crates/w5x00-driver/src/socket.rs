//! Socket driver
//!
//! [`SocketDriver`] owns the chip backend, the clock, the per-socket soft
//! state and the ephemeral port counter. Socket handles are plain indices;
//! the index equal to the socket count is the "no socket" sentinel returned
//! when every slot is busy, and every operation treats it as a no-op.
//!
//! Outcomes that are part of normal networking (no free slot, refused
//! connection, timeout) are return values. `Err` is reserved for the bus or
//! chip misbehaving.
//!
//! Every operation takes the bus through a [`Transaction`] guard and gives it
//! back before sleeping or yielding. The one exception is the soft-reset
//! poll in [`SocketDriver::new`], which runs before any socket exists.

use crate::backend::{ChipBackend, Transaction};
use crate::clock::Clock;
use crate::config::DriverConfig;
use crate::error::Result;
use crate::ports::EphemeralPorts;
use crate::registers::Registers;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};
use w5x00_chip::regs::{sn, sn_ir};
use w5x00_chip::{SocketCommand, SocketMode, SocketStatus};

/// Settle time between choosing a slot and reprogramming it
pub const OPEN_SETTLE: Duration = Duration::from_micros(250);

/// Interval between status polls in connect and stop
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a hardware socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u8);

impl SocketId {
    /// Handle for hardware socket `index`
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Hardware socket index
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket {}", self.0)
    }
}

/// Driver-side bookkeeping for one hardware socket
///
/// Reset whenever the socket is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketSlot {
    /// Cached received byte count, never above what the chip reports
    pub rx_pending: u16,
    /// Next read position in the RX ring (free-running)
    pub rx_read_pointer: u16,
    /// Bytes consumed but not yet released to the chip with RECV
    pub rx_unacked: u16,
    /// TX free space seen by the last poll (advisory)
    pub tx_free: u16,
}

/// Result of a receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many bytes were delivered
    Data(usize),
    /// Nothing buffered yet; the connection is still open
    WouldBlock,
    /// Nothing buffered and the peer is gone (or the socket never connected)
    Closed,
}

impl Received {
    /// Bytes delivered, zero for the non-data outcomes
    pub const fn len(self) -> usize {
        match self {
            Self::Data(n) => n,
            Self::WouldBlock | Self::Closed => 0,
        }
    }

    /// Whether no bytes were delivered
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Multicast MAC for an IPv4 group: `01:00:5E` + low 23 bits of the address
pub const fn multicast_mac(group: Ipv4Addr) -> [u8; 6] {
    let [_, b, c, d] = group.octets();
    [0x01, 0x00, 0x5E, b & 0x7F, c, d]
}

/// Socket-level driver over a chip backend
#[derive(Debug)]
pub struct SocketDriver<C: ChipBackend, K: Clock> {
    pub(crate) chip: C,
    pub(crate) clock: K,
    pub(crate) config: DriverConfig,
    pub(crate) slots: Vec<SocketSlot>,
    pub(crate) ports: EphemeralPorts,
    pub(crate) dns: Ipv4Addr,
}

impl<C: ChipBackend, K: Clock> SocketDriver<C, K> {
    /// Initialise `chip` and build a driver for its sockets
    ///
    /// # Errors
    ///
    /// Returns [`crate::W5x00Error::InvalidConfig`] for an unusable
    /// `config`, otherwise the backend's init error, typically
    /// [`crate::W5x00Error::ChipNotPresent`] or [`crate::W5x00Error::ChipBusy`].
    pub fn new(mut chip: C, mut clock: K, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        chip.init(&mut clock)?;
        let caps = *chip.capabilities();
        let ports = EphemeralPorts::seeded(clock.now().as_micros() as u64);
        info!(
            "{} socket driver: {} sockets, {} byte rings, first ephemeral seed {}",
            caps.variant,
            caps.socket_count,
            caps.buffer_size,
            ports.last()
        );
        Ok(Self {
            chip,
            clock,
            config,
            slots: vec![SocketSlot::default(); usize::from(caps.socket_count)],
            ports,
            dns: Ipv4Addr::UNSPECIFIED,
        })
    }

    /// Number of usable sockets
    pub fn socket_count(&self) -> u8 {
        self.chip.capabilities().socket_count
    }

    /// The "no socket" sentinel
    pub fn unallocated(&self) -> SocketId {
        SocketId(self.socket_count())
    }

    /// Whether `id` names a real socket
    pub fn is_valid(&self, id: SocketId) -> bool {
        id.0 < self.socket_count()
    }

    /// Whether two handles refer to the same real socket
    pub fn is_same_slot(&self, a: SocketId, b: SocketId) -> bool {
        a == b && self.is_valid(a)
    }

    /// Soft state of socket `id`
    pub fn slot(&self, id: SocketId) -> Option<&SocketSlot> {
        self.slots.get(usize::from(id.0))
    }

    /// Driver timing configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Chip backend
    pub fn chip(&self) -> &C {
        &self.chip
    }

    /// Chip backend, mutably
    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }

    /// Clock, mutably
    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Ephemeral port counter
    pub fn ports(&self) -> &EphemeralPorts {
        &self.ports
    }

    /// Mix entropy into the ephemeral port counter
    pub fn reseed_ports(&mut self, entropy: u16) {
        self.ports.reseed(entropy);
    }

    pub(crate) fn index(&self, id: SocketId) -> Option<u8> {
        self.is_valid(id).then_some(id.0)
    }

    // ── Allocation ──────────────────────────────────────────────────────────

    /// Open a socket in `mode` on `port` (0 = next ephemeral port)
    ///
    /// Takes the first CLOSED socket, else force-closes the first one
    /// lingering in a closing state. Returns [`Self::unallocated`] if every
    /// socket is in use.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn begin(&mut self, mode: SocketMode, port: u16) -> Result<SocketId> {
        self.allocate(mode, port, None)
    }

    /// Open a socket bound to multicast `group`:`port`
    ///
    /// Destination IP, port and the derived group MAC are programmed before
    /// OPEN, and the multicast flag is set in the mode register.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn begin_multicast(
        &mut self,
        mode: SocketMode,
        group: Ipv4Addr,
        port: u16,
    ) -> Result<SocketId> {
        self.allocate(mode.multicast(), port, Some(group))
    }

    fn allocate(&mut self, mode: SocketMode, port: u16, group: Option<Ipv4Addr>) -> Result<SocketId> {
        let count = self.socket_count();
        let polls = self.config.command_poll_limit;
        let chosen = {
            let mut tx = Transaction::begin(&mut self.chip)?;
            let mut statuses = Vec::with_capacity(usize::from(count));
            for s in 0..count {
                statuses.push(tx.socket_status(s)?);
            }

            if let Some(s) = statuses.iter().position(|&st| st == SocketStatus::Closed) {
                Some(s as u8)
            } else if let Some(s) = statuses.iter().position(|st| st.is_reclaimable()) {
                let s = s as u8;
                info!("Reclaiming socket {s} from {}", statuses[usize::from(s)]);
                tx.exec_socket_command(s, SocketCommand::Close, polls)?;
                Some(s)
            } else {
                None
            }
        };
        let Some(s) = chosen else {
            debug!("No free socket among {count}");
            return Ok(SocketId(count));
        };

        self.clock.delay(OPEN_SETTLE);
        let local_port = if port == 0 {
            self.ports.next_port()
        } else {
            port
        };
        let mut tx = Transaction::begin(&mut self.chip)?;
        tx.write_sn_u8(s, sn::MR, mode.raw())?;
        tx.write_sn_u8(s, sn::IR, sn_ir::ALL)?;
        tx.write_sn_u16(s, sn::PORT, local_port)?;
        if let Some(group) = group {
            // destination port is the one asked for, even when 0
            tx.write_sn_bytes(s, sn::DIPR, &group.octets())?;
            tx.write_sn_u16(s, sn::DPORT, port)?;
            tx.write_sn_bytes(s, sn::DHAR, &multicast_mac(group))?;
        }
        tx.exec_socket_command(s, SocketCommand::Open, polls)?;
        let rx_read_pointer = tx.read_sn_u16(s, sn::RX_RD)?;
        drop(tx);

        self.slots[usize::from(s)] = SocketSlot {
            rx_read_pointer,
            ..SocketSlot::default()
        };
        debug!("Opened socket {s}: mode {:#04x}, port {local_port}", mode.raw());
        Ok(SocketId(s))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// `Sn_SR`; the sentinel reports CLOSED
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn status(&mut self, id: SocketId) -> Result<SocketStatus> {
        let Some(s) = self.index(id) else {
            return Ok(SocketStatus::Closed);
        };
        Transaction::begin(&mut self.chip)?.socket_status(s)
    }

    /// Close immediately, without telling the peer
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn close(&mut self, id: SocketId) -> Result<()> {
        self.command(id, SocketCommand::Close)
    }

    /// Start a graceful disconnect (send FIN)
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn disconnect(&mut self, id: SocketId) -> Result<()> {
        self.command(id, SocketCommand::Disconnect)
    }

    /// Graceful disconnect, then close once CLOSED or after the configured
    /// stop timeout
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn stop(&mut self, id: SocketId) -> Result<()> {
        self.stop_timeout(id, self.config.stop_timeout)
    }

    /// [`Self::stop`] with an explicit timeout
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn stop_timeout(&mut self, id: SocketId, timeout: Duration) -> Result<()> {
        if !self.is_valid(id) {
            return Ok(());
        }
        self.disconnect(id)?;
        let start = self.clock.now();
        loop {
            if self.status(id)? == SocketStatus::Closed {
                debug!("{id} closed gracefully");
                return Ok(());
            }
            if self.clock.since(start) >= timeout {
                break;
            }
            self.clock.delay(STATUS_POLL_INTERVAL);
        }
        warn!("{id} did not close within {timeout:?}, forcing");
        self.close(id)
    }

    /// Switch an INIT socket to LISTEN
    ///
    /// Returns `false` if the socket is not in INIT.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn listen(&mut self, id: SocketId) -> Result<bool> {
        let Some(s) = self.index(id) else {
            return Ok(false);
        };
        let polls = self.config.command_poll_limit;
        let mut tx = Transaction::begin(&mut self.chip)?;
        if tx.socket_status(s)? != SocketStatus::Init {
            return Ok(false);
        }
        tx.exec_socket_command(s, SocketCommand::Listen, polls)?;
        Ok(true)
    }

    /// Connect with the configured default timeout
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn connect(&mut self, id: SocketId, ip: Ipv4Addr, port: u16) -> Result<bool> {
        self.connect_timeout(id, ip, port, self.config.connect_timeout)
    }

    /// Connect to `ip`:`port`, waiting up to `timeout`
    ///
    /// `true` once ESTABLISHED (or already CLOSE_WAIT), `false` if the chip
    /// reports CLOSED or time runs out; on timeout the socket is closed.
    /// The unspecified and broadcast addresses are refused without touching
    /// the chip.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn connect_timeout(
        &mut self,
        id: SocketId,
        ip: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<bool> {
        let Some(s) = self.index(id) else {
            return Ok(false);
        };
        if ip.is_unspecified() || ip.is_broadcast() {
            debug!("{id}: refusing to connect to {ip}");
            return Ok(false);
        }

        let polls = self.config.command_poll_limit;
        {
            let mut tx = Transaction::begin(&mut self.chip)?;
            tx.write_sn_bytes(s, sn::DIPR, &ip.octets())?;
            tx.write_sn_u16(s, sn::DPORT, port)?;
            tx.exec_socket_command(s, SocketCommand::Connect, polls)?;
        }

        let start = self.clock.now();
        loop {
            match self.status(id)? {
                SocketStatus::Established | SocketStatus::CloseWait => {
                    info!("{id} connected to {ip}:{port}");
                    return Ok(true);
                }
                SocketStatus::Closed => {
                    debug!("{id}: connection to {ip}:{port} refused");
                    return Ok(false);
                }
                _ => {}
            }
            if self.clock.since(start) >= timeout {
                warn!("{id}: connect to {ip}:{port} timed out after {timeout:?}");
                self.close(id)?;
                return Ok(false);
            }
            self.clock.delay(STATUS_POLL_INTERVAL);
        }
    }

    /// Whether the connection is usable
    ///
    /// A peer that has closed still counts as connected while unread data
    /// remains.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn connected(&mut self, id: SocketId) -> Result<bool> {
        Ok(match self.status(id)? {
            SocketStatus::Listen | SocketStatus::Closed | SocketStatus::FinWait => false,
            SocketStatus::CloseWait => self.recv_available(id)? > 0,
            _ => true,
        })
    }

    // ── Addressing ──────────────────────────────────────────────────────────

    /// Local port (`Sn_PORT`); 0 for the sentinel
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn local_port(&mut self, id: SocketId) -> Result<u16> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        Transaction::begin(&mut self.chip)?.read_sn_u16(s, sn::PORT)
    }

    /// Peer address (`Sn_DIPR`); unspecified for the sentinel
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn remote_ip(&mut self, id: SocketId) -> Result<Ipv4Addr> {
        let Some(s) = self.index(id) else {
            return Ok(Ipv4Addr::UNSPECIFIED);
        };
        let mut octets = [0u8; 4];
        Transaction::begin(&mut self.chip)?.read_sn_bytes(s, sn::DIPR, &mut octets)?;
        Ok(Ipv4Addr::from(octets))
    }

    /// Peer port (`Sn_DPORT`); 0 for the sentinel
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn remote_port(&mut self, id: SocketId) -> Result<u16> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        Transaction::begin(&mut self.chip)?.read_sn_u16(s, sn::DPORT)
    }

    pub(crate) fn command(&mut self, id: SocketId, command: SocketCommand) -> Result<()> {
        let Some(s) = self.index(id) else {
            return Ok(());
        };
        let polls = self.config.command_poll_limit;
        Transaction::begin(&mut self.chip)?.exec_socket_command(s, command, polls)
    }
}

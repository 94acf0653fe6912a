// SPDX-License-Identifier: AGPL-3.0-only

//! Software chip model
//!
//! [`SoftwareBus`] implements [`SpiBus`] by decoding the frames of one W5x00
//! variant and applying them to an in-memory register file. Hand it to the
//! matching backend and the whole driver stack runs unchanged:
//!
//! ```text
//! SocketDriver ─→ W5500<SoftwareBus> ─→ frames ─→ SoftwareBus
//!                                                  ├─ common registers
//!                                                  ├─ socket registers + command effects
//!                                                  └─ TX / RX rings
//! ```
//!
//! ## What is modelled
//!
//! - Soft reset (`MR.RST` self-clears after a configurable number of polls),
//!   plus an absent chip (reads `0xFF`) and one stuck in reset
//! - Socket commands and their status transitions; the peer side is driven
//!   from the test through the scripting methods
//! - Ring memory with wraparound at the configured ring size
//! - `Sn_TX_FSR` / `Sn_RX_RSR` as live counters, optionally jittered so the
//!   debounce loop has something to do
//! - SEND completion through `Sn_IR`, optionally delayed or reported as a
//!   timeout
//!
//! Anything the driver never touches (interrupt masks, PPPoE, retransmission
//! timers) reads back as plain storage.
//!
//! Socket indices passed to the inspection and scripting methods must be
//! below the variant's socket maximum; they panic otherwise.

use crate::bus::{Payload, SpiBus};
use crate::error::{Result, W5x00Error};
use std::net::Ipv4Addr;
use tracing::trace;
use w5x00_chip::frame::{w5100, w5200, w5500, Direction};
use w5x00_chip::regs::{self, mode, sn, sn_ir};
use w5x00_chip::{ChipVariant, SocketCommand, SocketMode, SocketStatus};

/// Size of the modelled common register block
const COMMON_SIZE: usize = 0x100;

/// Largest ring any variant supports
const RING_CAPACITY: usize = 0x4000;

/// Polls of `MR` that still show the reset bit after a soft reset
const DEFAULT_RESET_POLLS: u32 = 2;

/// How the modelled chip answers the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Normal chip
    #[default]
    Present,
    /// Nothing on the bus: every read is `0xFF`, writes vanish
    Absent,
    /// Chip answers but `MR` never leaves reset
    StuckInReset,
}

/// One UDP datagram handed to the wire by a SEND command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Destination address from `Sn_DIPR`
    pub ip: Ipv4Addr,
    /// Destination port from `Sn_DPORT`
    pub port: u16,
    /// Bytes between `Sn_TX_RD` and `Sn_TX_WR` at SEND time
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Location {
    Common(u16),
    Socket(u8, u16),
    Tx(u8, u16),
    Rx(u8, u16),
    Unmapped,
}

#[derive(Debug, Clone, Copy)]
enum Start {
    Flat(u16),
    Block(w5500::Block, u16),
}

/// Socket register file and ring memory; cleared by soft reset
#[derive(Debug, Clone)]
struct SocketRegs {
    mode: u8,
    ir: u8,
    status: SocketStatus,
    port: [u8; 2],
    dhar: [u8; 6],
    dipr: [u8; 4],
    dport: [u8; 2],
    mssr: [u8; 2],
    ttl: u8,
    rxbuf_kib: u8,
    txbuf_kib: u8,
    tx_rd: u16,
    tx_wr: u16,
    rx_rd: u16,
    /// `Sn_RX_RD` as of the last RECV command; `Sn_RX_RSR` counts from here
    rx_acked: u16,
    rx_wr: u16,
    fsr_latch: u16,
    rsr_latch: u16,
    /// Interrupt bits raised after this many more `Sn_IR` reads
    pending_irq: Option<(u32, u8)>,
    status_reads: u32,
    tx_ring: Vec<u8>,
    rx_ring: Vec<u8>,
}

impl Default for SocketRegs {
    fn default() -> Self {
        Self {
            mode: 0,
            ir: 0,
            status: SocketStatus::Closed,
            port: [0; 2],
            dhar: [0xFF; 6],
            dipr: [0; 4],
            dport: [0; 2],
            mssr: [0; 2],
            ttl: 0x80,
            rxbuf_kib: 2,
            txbuf_kib: 2,
            tx_rd: 0,
            tx_wr: 0,
            rx_rd: 0,
            rx_acked: 0,
            rx_wr: 0,
            fsr_latch: 0,
            rsr_latch: 0,
            pending_irq: None,
            status_reads: 0,
            tx_ring: vec![0; RING_CAPACITY],
            rx_ring: vec![0; RING_CAPACITY],
        }
    }
}

/// Peer and timing behaviour scripted by the test; survives soft reset
#[derive(Debug, Clone)]
struct SocketScript {
    connect_after: Option<u32>,
    close_after: Option<u32>,
    tx_backlog: u16,
    backlog_drain: u16,
    send_ok_delay: u32,
    send_timeout: bool,
    close_on_send: bool,
}

impl Default for SocketScript {
    fn default() -> Self {
        Self {
            connect_after: Some(1),
            close_after: Some(0),
            tx_backlog: 0,
            backlog_drain: 0,
            send_ok_delay: 0,
            send_timeout: false,
            close_on_send: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SocketLog {
    sent: Vec<u8>,
    datagrams: Vec<Datagram>,
    commands: Vec<SocketCommand>,
    recv_commands: u32,
    rx_rd_writes: u32,
}

#[derive(Debug, Clone, Default)]
struct SimSocket {
    regs: SocketRegs,
    script: SocketScript,
    log: SocketLog,
}

impl SimSocket {
    fn poll_status(&mut self) -> u8 {
        self.regs.status_reads += 1;
        let reads = self.regs.status_reads;
        self.script.tx_backlog = self.script.tx_backlog.saturating_sub(self.script.backlog_drain);
        match self.regs.status {
            SocketStatus::SynSent if self.script.connect_after.is_some_and(|n| reads >= n) => {
                self.regs.status = SocketStatus::Established;
            }
            SocketStatus::FinWait if self.script.close_after.is_some_and(|n| reads >= n) => {
                self.regs.status = SocketStatus::Closed;
            }
            _ => {}
        }
        self.regs.status.raw()
    }

    fn poll_irq(&mut self) -> u8 {
        if let Some((remaining, bits)) = self.regs.pending_irq {
            if remaining == 0 {
                self.regs.ir |= bits;
                self.regs.pending_irq = None;
            } else {
                self.regs.pending_irq = Some((remaining - 1, bits));
            }
        }
        self.regs.ir
    }

    /// SEND drains the ring at once, so only the scripted backlog is in flight
    fn free_size(&self, ring: u16) -> u16 {
        ring.saturating_sub(self.script.tx_backlog)
    }

    fn received_size(&self) -> u16 {
        self.regs.rx_wr.wrapping_sub(self.regs.rx_acked)
    }

    fn transmit(&mut self, ring: u16) {
        let regs = &mut self.regs;
        let len = regs.tx_wr.wrapping_sub(regs.tx_rd);
        let payload: Vec<u8> = (0..len)
            .map(|i| regs.tx_ring[usize::from(regs.tx_rd.wrapping_add(i) % ring)])
            .collect();
        regs.tx_rd = regs.tx_wr;

        if self.script.close_on_send {
            regs.status = SocketStatus::Closed;
            return;
        }
        if regs.status == SocketStatus::Udp {
            self.log.datagrams.push(Datagram {
                ip: Ipv4Addr::from(regs.dipr),
                port: u16::from_be_bytes(regs.dport),
                payload,
            });
        } else {
            self.log.sent.extend_from_slice(&payload);
        }
        let bits = if self.script.send_timeout {
            sn_ir::TIMEOUT
        } else {
            sn_ir::SEND_OK
        };
        regs.pending_irq = Some((self.script.send_ok_delay, bits));
    }
}

/// In-memory W5x00 reachable through [`SpiBus`]
#[derive(Debug, Clone)]
pub struct SoftwareBus {
    variant: ChipVariant,
    presence: Presence,
    common: Vec<u8>,
    sockets: Vec<SimSocket>,
    reset_polls: u32,
    reset_remaining: u32,
    link_up: bool,
    counter_jitter: u32,
    open_pointer: u16,
    in_transaction: bool,
    transactions: u64,
    frames: u64,
}

impl SoftwareBus {
    /// Powered-up chip of `variant`, link up
    pub fn new(variant: ChipVariant) -> Self {
        let mut bus = Self {
            variant,
            presence: Presence::Present,
            common: vec![0; COMMON_SIZE],
            sockets: vec![SimSocket::default(); usize::from(variant.max_sockets())],
            reset_polls: DEFAULT_RESET_POLLS,
            reset_remaining: 0,
            link_up: true,
            counter_jitter: 0,
            open_pointer: 0,
            in_transaction: false,
            transactions: 0,
            frames: 0,
        };
        bus.power_on();
        bus
    }

    /// Change how the chip answers the bus
    #[must_use]
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    /// Number of `MR` polls that still read the reset bit
    #[must_use]
    pub fn with_reset_polls(mut self, polls: u32) -> Self {
        self.reset_polls = polls;
        self
    }

    /// Initial PHY link state
    #[must_use]
    pub fn with_link(mut self, up: bool) -> Self {
        self.link_up = up;
        self
    }

    /// Pointer value every socket starts from after OPEN
    #[must_use]
    pub fn with_open_pointer(mut self, pointer: u16) -> Self {
        self.open_pointer = pointer;
        self
    }

    /// Variant whose framing this bus decodes
    pub fn variant(&self) -> ChipVariant {
        self.variant
    }

    // ── Scripting ───────────────────────────────────────────────────────────

    /// Plug or unplug the cable
    pub fn set_link(&mut self, up: bool) {
        self.link_up = up;
    }

    /// Perturb the next `reads` counter reads by a decreasing offset
    pub fn set_counter_jitter(&mut self, reads: u32) {
        self.counter_jitter = reads;
    }

    /// Pointer value sockets start from after the next OPEN
    pub fn set_open_pointer(&mut self, pointer: u16) {
        self.open_pointer = pointer;
    }

    /// Establish after `polls` status reads following CONNECT; `None` never
    pub fn set_connect_after(&mut self, socket: u8, polls: Option<u32>) {
        self.sock_mut(socket).script.connect_after = polls;
    }

    /// Reach CLOSED after `polls` status reads following DISCON; `None` never
    pub fn set_close_after(&mut self, socket: u8, polls: Option<u32>) {
        self.sock_mut(socket).script.close_after = polls;
    }

    /// Hold `bytes` of the TX ring as unacknowledged, releasing `drain`
    /// bytes on every status read
    pub fn set_tx_backlog(&mut self, socket: u8, bytes: u16, drain: u16) {
        let script = &mut self.sock_mut(socket).script;
        script.tx_backlog = bytes;
        script.backlog_drain = drain;
    }

    /// Raise SEND completion only after `reads` further `Sn_IR` reads
    pub fn set_send_ok_delay(&mut self, socket: u8, reads: u32) {
        self.sock_mut(socket).script.send_ok_delay = reads;
    }

    /// Complete SENDs with TIMEOUT instead of SEND_OK
    pub fn set_send_timeout(&mut self, socket: u8, timeout: bool) {
        self.sock_mut(socket).script.send_timeout = timeout;
    }

    /// Drop the connection when SEND is issued
    pub fn set_close_on_send(&mut self, socket: u8, close: bool) {
        self.sock_mut(socket).script.close_on_send = close;
    }

    /// Force `Sn_SR`
    pub fn set_status(&mut self, socket: u8, status: SocketStatus) {
        self.sock_mut(socket).regs.status = status;
    }

    /// A listening socket accepts a connection from `ip:port`
    pub fn accept(&mut self, socket: u8, ip: Ipv4Addr, port: u16) {
        let regs = &mut self.sock_mut(socket).regs;
        if regs.status == SocketStatus::Listen {
            regs.status = SocketStatus::Established;
            regs.dipr = ip.octets();
            regs.dport = port.to_be_bytes();
            regs.ir |= sn_ir::CON;
        }
    }

    /// Peer sends FIN
    pub fn peer_close(&mut self, socket: u8) {
        let regs = &mut self.sock_mut(socket).regs;
        if regs.status == SocketStatus::Established {
            regs.status = SocketStatus::CloseWait;
            regs.ir |= sn_ir::DISCON;
        }
    }

    /// Deliver bytes from the peer into the RX ring
    ///
    /// Returns how many fit.
    pub fn inject_rx(&mut self, socket: u8, data: &[u8]) -> usize {
        let ring = self.ring_size();
        let sock = self.sock_mut(socket);
        let space = usize::from(ring - sock.received_size().min(ring));
        let n = data.len().min(space);
        for &byte in &data[..n] {
            let at = usize::from(sock.regs.rx_wr % ring);
            sock.regs.rx_ring[at] = byte;
            sock.regs.rx_wr = sock.regs.rx_wr.wrapping_add(1);
        }
        if n > 0 {
            sock.regs.ir |= sn_ir::RECV;
        }
        n
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// Current `Sn_SR`
    pub fn status(&self, socket: u8) -> SocketStatus {
        self.sock(socket).regs.status
    }

    /// TCP payload handed to the wire since the last OPEN
    pub fn sent(&self, socket: u8) -> &[u8] {
        &self.sock(socket).log.sent
    }

    /// UDP datagrams handed to the wire since the last OPEN
    pub fn datagrams(&self, socket: u8) -> &[Datagram] {
        &self.sock(socket).log.datagrams
    }

    /// Every command issued to `socket`, oldest first
    pub fn commands(&self, socket: u8) -> &[SocketCommand] {
        &self.sock(socket).log.commands
    }

    /// Number of RECV commands issued
    pub fn recv_commands(&self, socket: u8) -> u32 {
        self.sock(socket).log.recv_commands
    }

    /// Number of 16-bit writes to `Sn_RX_RD`
    pub fn rx_rd_writes(&self, socket: u8) -> u32 {
        self.sock(socket).log.rx_rd_writes
    }

    /// Bytes in the RX ring not yet released by RECV
    pub fn rx_unacked(&self, socket: u8) -> u16 {
        self.sock(socket).received_size()
    }

    /// `Sn_RX_RD` as last written by the driver
    pub fn rx_read_pointer(&self, socket: u8) -> u16 {
        self.sock(socket).regs.rx_rd
    }

    /// `Sn_TX_WR` as last written by the driver
    pub fn tx_write_pointer(&self, socket: u8) -> u16 {
        self.sock(socket).regs.tx_wr
    }

    /// `Sn_MR`
    pub fn socket_mode(&self, socket: u8) -> SocketMode {
        SocketMode::from_raw(self.sock(socket).regs.mode)
    }

    /// `Sn_PORT`
    pub fn local_port(&self, socket: u8) -> u16 {
        u16::from_be_bytes(self.sock(socket).regs.port)
    }

    /// `Sn_DIPR` and `Sn_DPORT`
    pub fn destination(&self, socket: u8) -> (Ipv4Addr, u16) {
        let regs = &self.sock(socket).regs;
        (Ipv4Addr::from(regs.dipr), u16::from_be_bytes(regs.dport))
    }

    /// `Sn_DHAR`
    pub fn destination_mac(&self, socket: u8) -> [u8; 6] {
        self.sock(socket).regs.dhar
    }

    /// `Sn_IR`
    pub fn interrupts(&self, socket: u8) -> u8 {
        self.sock(socket).regs.ir
    }

    /// `Sn_RXBUF_SIZE` and `Sn_TXBUF_SIZE`
    pub fn buffer_kib(&self, socket: u8) -> (u8, u8) {
        let regs = &self.sock(socket).regs;
        (regs.rxbuf_kib, regs.txbuf_kib)
    }

    /// Raw common registers
    pub fn common(&self, addr: u16, len: usize) -> &[u8] {
        let start = usize::from(addr);
        &self.common[start..start + len]
    }

    /// Ring size the chip is currently configured for
    pub fn ring_size(&self) -> u16 {
        match self.variant {
            ChipVariant::W5100 => 1024 << (self.common[usize::from(regs::TMSR)] & 0x03),
            ChipVariant::W5200 | ChipVariant::W5500 => {
                u16::from(self.sockets[0].regs.txbuf_kib.clamp(1, 16)) * 1024
            }
        }
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Transactions begun so far
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Frames exchanged so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    // ── Model ───────────────────────────────────────────────────────────────

    fn sock(&self, socket: u8) -> &SimSocket {
        &self.sockets[usize::from(socket)]
    }

    fn sock_mut(&mut self, socket: u8) -> &mut SimSocket {
        &mut self.sockets[usize::from(socket)]
    }

    fn power_on(&mut self) {
        self.common.fill(0);
        if self.variant == ChipVariant::W5100 {
            self.common[usize::from(regs::TMSR)] = 0x55;
            self.common[usize::from(regs::RMSR)] = 0x55;
        }
        if self.variant == ChipVariant::W5500 {
            self.common[usize::from(regs::VERSIONR_W5500)] = 0x04;
        }
        for sock in &mut self.sockets {
            sock.regs = SocketRegs::default();
        }
    }

    fn soft_reset(&mut self) {
        trace!("{} model: soft reset", self.variant);
        self.power_on();
        self.reset_remaining = self.reset_polls;
    }

    fn decode_header(&self, header: &[u8], len: usize) -> Result<(Direction, Start)> {
        match self.variant {
            ChipVariant::W5100 => {
                let header: [u8; 3] = header
                    .try_into()
                    .map_err(|_| W5x00Error::bus("W5100 header must be 3 bytes"))?;
                let (dir, addr) = w5100::decode(header).ok_or_else(|| {
                    W5x00Error::bus(format!("W5100 opcode {:#04x} invalid", header[0]))
                })?;
                if len != 1 {
                    return Err(W5x00Error::bus("W5100 frames carry exactly one byte"));
                }
                Ok((dir, Start::Flat(addr)))
            }
            ChipVariant::W5200 => {
                let header: [u8; 4] = header
                    .try_into()
                    .map_err(|_| W5x00Error::bus("W5200 header must be 4 bytes"))?;
                let (dir, addr, count) = w5200::decode(header);
                if usize::from(count) != len {
                    return Err(W5x00Error::bus(format!(
                        "W5200 header announces {count} bytes, data phase has {len}"
                    )));
                }
                Ok((dir, Start::Flat(addr)))
            }
            ChipVariant::W5500 => {
                let header: [u8; 3] = header
                    .try_into()
                    .map_err(|_| W5x00Error::bus("W5500 header must be 3 bytes"))?;
                let (dir, block, field) = w5500::decode(header).ok_or_else(|| {
                    W5x00Error::bus(format!("W5500 block select {:#04x} reserved", header[2]))
                })?;
                Ok((dir, Start::Block(block, field)))
            }
        }
    }

    fn locate(&self, start: Start, index: usize) -> Location {
        let ring = self.ring_size();
        match start {
            Start::Flat(addr) => self.locate_flat(addr.wrapping_add(index as u16), ring),
            Start::Block(block, field) => {
                let at = field.wrapping_add(index as u16);
                match block {
                    w5500::Block::Common => Location::Common(at),
                    w5500::Block::Socket(s) => Location::Socket(s, at),
                    w5500::Block::Tx(s) => Location::Tx(s, at % ring),
                    w5500::Block::Rx(s) => Location::Rx(s, at % ring),
                }
            }
        }
    }

    fn locate_flat(&self, addr: u16, ring: u16) -> Location {
        let socket_base = self.variant.socket_register_base();
        let socket_end =
            u32::from(socket_base) + self.sockets.len() as u32 * u32::from(regs::SOCKET_STRIDE);
        let tx = self.variant.tx_region();
        let rx = self.variant.rx_region();
        let rx_end = u32::from(rx) + u32::from(rx - tx);

        if usize::from(addr) < COMMON_SIZE {
            Location::Common(addr)
        } else if addr >= socket_base && u32::from(addr) < socket_end {
            Location::Socket(((addr - socket_base) >> 8) as u8, addr & 0x00FF)
        } else if (tx..rx).contains(&addr) {
            let offset = addr - tx;
            Location::Tx((offset / ring) as u8, offset % ring)
        } else if addr >= rx && u32::from(addr) < rx_end {
            let offset = addr - rx;
            Location::Rx((offset / ring) as u8, offset % ring)
        } else {
            Location::Unmapped
        }
    }

    fn read_at(&mut self, location: Location) -> u8 {
        if self.presence == Presence::Absent {
            return 0xFF;
        }
        match location {
            Location::Common(addr) => self.read_common(addr),
            Location::Socket(s, offset) => self.read_socket(s, offset),
            Location::Tx(s, offset) => self
                .sockets
                .get(usize::from(s))
                .map_or(0, |sock| sock.regs.tx_ring[usize::from(offset)]),
            Location::Rx(s, offset) => self
                .sockets
                .get(usize::from(s))
                .map_or(0, |sock| sock.regs.rx_ring[usize::from(offset)]),
            Location::Unmapped => 0,
        }
    }

    fn write_at(&mut self, location: Location, value: u8) {
        if self.presence == Presence::Absent {
            return;
        }
        match location {
            Location::Common(addr) => self.write_common(addr, value),
            Location::Socket(s, offset) => self.write_socket(s, offset, value),
            Location::Tx(s, offset) => {
                if let Some(sock) = self.sockets.get_mut(usize::from(s)) {
                    sock.regs.tx_ring[usize::from(offset)] = value;
                }
            }
            Location::Rx(s, offset) => {
                if let Some(sock) = self.sockets.get_mut(usize::from(s)) {
                    sock.regs.rx_ring[usize::from(offset)] = value;
                }
            }
            Location::Unmapped => {}
        }
    }

    fn read_common(&mut self, addr: u16) -> u8 {
        if addr == regs::MR {
            if self.presence == Presence::StuckInReset {
                return mode::RESET;
            }
            if self.reset_remaining > 0 {
                self.reset_remaining -= 1;
                return mode::RESET;
            }
        }
        if let Some((phy, mask)) = self.variant.phy_link() {
            if addr == phy {
                return if self.link_up { mask } else { 0 };
            }
        }
        self.common.get(usize::from(addr)).copied().unwrap_or(0)
    }

    fn write_common(&mut self, addr: u16, value: u8) {
        if addr == regs::MR && value & mode::RESET != 0 {
            self.soft_reset();
            return;
        }
        if let Some(slot) = self.common.get_mut(usize::from(addr)) {
            *slot = value;
        }
    }

    fn next_jitter(&mut self) -> u16 {
        if self.counter_jitter == 0 {
            return 0;
        }
        let offset = self.counter_jitter as u16;
        self.counter_jitter -= 1;
        offset
    }

    fn read_socket(&mut self, socket: u8, offset: u16) -> u8 {
        let ring = self.ring_size();
        let jitter = match offset {
            sn::TX_FSR | sn::RX_RSR => self.next_jitter(),
            _ => 0,
        };
        let Some(sock) = self.sockets.get_mut(usize::from(socket)) else {
            return 0;
        };
        let hi = |v: u16| v.to_be_bytes()[0];
        let lo = |v: u16| v.to_be_bytes()[1];
        match offset {
            sn::IR => return sock.poll_irq(),
            sn::SR => return sock.poll_status(),
            sn::TX_FSR => {
                let value = sock.free_size(ring).wrapping_add(jitter);
                sock.regs.fsr_latch = value;
                return hi(value);
            }
            sn::RX_RSR => {
                let value = sock.received_size().wrapping_add(jitter);
                sock.regs.rsr_latch = value;
                return hi(value);
            }
            _ => {}
        }
        let regs = &sock.regs;
        match offset {
            sn::MR => regs.mode,
            0x04..=0x05 => regs.port[usize::from(offset - sn::PORT)],
            0x06..=0x0B => regs.dhar[usize::from(offset - sn::DHAR)],
            0x0C..=0x0F => regs.dipr[usize::from(offset - sn::DIPR)],
            0x10..=0x11 => regs.dport[usize::from(offset - sn::DPORT)],
            0x12..=0x13 => regs.mssr[usize::from(offset - sn::MSSR)],
            sn::TTL => regs.ttl,
            sn::RXBUF_SIZE => regs.rxbuf_kib,
            sn::TXBUF_SIZE => regs.txbuf_kib,
            0x21 => lo(regs.fsr_latch),
            sn::TX_RD => hi(regs.tx_rd),
            0x23 => lo(regs.tx_rd),
            sn::TX_WR => hi(regs.tx_wr),
            0x25 => lo(regs.tx_wr),
            0x27 => lo(regs.rsr_latch),
            sn::RX_RD => hi(regs.rx_rd),
            0x29 => lo(regs.rx_rd),
            sn::RX_WR => hi(regs.rx_wr),
            0x2B => lo(regs.rx_wr),
            _ => 0,
        }
    }

    fn write_socket(&mut self, socket: u8, offset: u16, value: u8) {
        if offset == sn::CR {
            self.command(socket, value);
            return;
        }
        let Some(sock) = self.sockets.get_mut(usize::from(socket)) else {
            return;
        };
        let regs = &mut sock.regs;
        match offset {
            sn::MR => regs.mode = value,
            sn::IR => regs.ir &= !value,
            0x04..=0x05 => regs.port[usize::from(offset - sn::PORT)] = value,
            0x06..=0x0B => regs.dhar[usize::from(offset - sn::DHAR)] = value,
            0x0C..=0x0F => regs.dipr[usize::from(offset - sn::DIPR)] = value,
            0x10..=0x11 => regs.dport[usize::from(offset - sn::DPORT)] = value,
            0x12..=0x13 => regs.mssr[usize::from(offset - sn::MSSR)] = value,
            sn::TTL => regs.ttl = value,
            sn::RXBUF_SIZE => regs.rxbuf_kib = value,
            sn::TXBUF_SIZE => regs.txbuf_kib = value,
            sn::TX_WR => set_byte(&mut regs.tx_wr, 0, value),
            0x25 => set_byte(&mut regs.tx_wr, 1, value),
            sn::RX_RD => set_byte(&mut regs.rx_rd, 0, value),
            0x29 => {
                set_byte(&mut regs.rx_rd, 1, value);
                sock.log.rx_rd_writes += 1;
            }
            // counters and the remaining pointers are read-only
            _ => {}
        }
    }

    fn command(&mut self, socket: u8, raw: u8) {
        let ring = self.ring_size();
        let open_pointer = self.open_pointer;
        let variant = self.variant;
        let Some(sock) = self.sockets.get_mut(usize::from(socket)) else {
            return;
        };
        let Some(command) = SocketCommand::from_raw(raw) else {
            trace!("{variant} model: socket {socket} ignores command {raw:#04x}");
            return;
        };
        trace!("{variant} model: socket {socket} {command:?}");
        sock.log.commands.push(command);
        sock.regs.status_reads = 0;

        let regs = &mut sock.regs;
        match command {
            SocketCommand::Open => {
                regs.status = match SocketMode::from_raw(regs.mode).protocol() {
                    0x01 => SocketStatus::Init,
                    0x02 => SocketStatus::Udp,
                    0x03 => SocketStatus::IpRaw,
                    0x04 => SocketStatus::MacRaw,
                    _ => SocketStatus::Closed,
                };
                regs.tx_rd = open_pointer;
                regs.tx_wr = open_pointer;
                regs.rx_rd = open_pointer;
                regs.rx_acked = open_pointer;
                regs.rx_wr = open_pointer;
                regs.pending_irq = None;
                sock.log.sent.clear();
                sock.log.datagrams.clear();
            }
            SocketCommand::Listen => {
                if regs.status == SocketStatus::Init {
                    regs.status = SocketStatus::Listen;
                }
            }
            SocketCommand::Connect => {
                if regs.status == SocketStatus::Init {
                    regs.status = SocketStatus::SynSent;
                }
            }
            SocketCommand::Disconnect => {
                regs.status = match regs.status {
                    SocketStatus::Established | SocketStatus::CloseWait
                        if sock.script.close_after != Some(0) =>
                    {
                        SocketStatus::FinWait
                    }
                    _ => SocketStatus::Closed,
                };
            }
            SocketCommand::Close => {
                regs.status = SocketStatus::Closed;
                regs.pending_irq = None;
            }
            SocketCommand::Send | SocketCommand::SendMac => sock.transmit(ring),
            SocketCommand::SendKeep => {}
            SocketCommand::Recv => {
                regs.rx_acked = regs.rx_rd;
                sock.log.recv_commands += 1;
            }
        }
    }
}

fn set_byte(word: &mut u16, index: usize, value: u8) {
    let mut bytes = word.to_be_bytes();
    bytes[index] = value;
    *word = u16::from_be_bytes(bytes);
}

impl SpiBus for SoftwareBus {
    fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(W5x00Error::bus("transaction already open"));
        }
        self.in_transaction = true;
        self.transactions += 1;
        Ok(())
    }

    fn end_transaction(&mut self) {
        self.in_transaction = false;
    }

    fn frame(&mut self, header: &[u8], payload: Payload<'_>) -> Result<()> {
        if !self.in_transaction {
            return Err(W5x00Error::bus("frame outside a transaction"));
        }
        self.frames += 1;
        let (dir, start) = self.decode_header(header, payload.len())?;
        match (dir, payload) {
            (Direction::Read, Payload::Read(buf)) => {
                for (i, byte) in buf.iter_mut().enumerate() {
                    let location = self.locate(start, i);
                    *byte = self.read_at(location);
                }
                Ok(())
            }
            (Direction::Write, Payload::Write(data)) => {
                for (i, &byte) in data.iter().enumerate() {
                    let location = self.locate(start, i);
                    self.write_at(location, byte);
                }
                Ok(())
            }
            _ => Err(W5x00Error::bus("header direction does not match data phase")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(bus: &mut SoftwareBus, header: &[u8], data: &[u8]) {
        bus.begin_transaction().unwrap();
        bus.frame(header, Payload::Write(data)).unwrap();
        bus.end_transaction();
    }

    fn read(bus: &mut SoftwareBus, header: &[u8], len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        bus.begin_transaction().unwrap();
        bus.frame(header, Payload::Read(&mut buf)).unwrap();
        bus.end_transaction();
        buf
    }

    #[test]
    fn reset_bit_clears_after_configured_polls() {
        let mut bus = SoftwareBus::new(ChipVariant::W5500).with_reset_polls(3);
        write(&mut bus, &w5500::header(Direction::Write, regs::MR, 2048), &[mode::RESET]);
        let mr = w5500::header(Direction::Read, regs::MR, 2048);
        let polls: Vec<u8> = (0..4).map(|_| read(&mut bus, &mr, 1)[0]).collect();
        assert_eq!(polls, vec![0x80, 0x80, 0x80, 0x00]);
    }

    #[test]
    fn absent_chip_reads_all_ones() {
        let mut bus = SoftwareBus::new(ChipVariant::W5200).with_presence(Presence::Absent);
        let got = read(&mut bus, &w5200::header(Direction::Read, regs::MR, 2), 2);
        assert_eq!(got, vec![0xFF, 0xFF]);
    }

    #[test]
    fn frames_require_a_transaction() {
        let mut bus = SoftwareBus::new(ChipVariant::W5100);
        let mut byte = [0u8];
        let header = w5100::header(Direction::Read, regs::MR);
        assert!(bus.frame(&header, Payload::Read(&mut byte)).is_err());
        bus.begin_transaction().unwrap();
        assert!(bus.begin_transaction().is_err());
    }

    #[test]
    fn w5200_length_must_match() {
        let mut bus = SoftwareBus::new(ChipVariant::W5200);
        bus.begin_transaction().unwrap();
        let header = w5200::header(Direction::Write, regs::GAR, 4);
        assert!(bus.frame(&header, Payload::Write(&[1, 2, 3])).is_err());
    }

    #[test]
    fn w5500_ring_access_wraps_inside_block() {
        let mut bus = SoftwareBus::new(ChipVariant::W5500);
        // 2 KiB rings after power-on; start 2 bytes before the end of socket 1's TX ring
        let addr = w5500::TX_RINGS + 2048 + 2046;
        write(&mut bus, &w5500::header(Direction::Write, addr, 2048), &[1, 2, 3, 4]);
        let tail = read(&mut bus, &w5500::header(Direction::Read, addr, 2048), 2);
        let head = read(
            &mut bus,
            &w5500::header(Direction::Read, w5500::TX_RINGS + 2048, 2048),
            2,
        );
        assert_eq!(tail, vec![1, 2]);
        assert_eq!(head, vec![3, 4]);
    }

    #[test]
    fn rx_injection_is_bounded_by_ring() {
        let mut bus = SoftwareBus::new(ChipVariant::W5100);
        assert_eq!(bus.ring_size(), 2048);
        assert_eq!(bus.inject_rx(0, &[0xAA; 3000]), 2048);
        assert_eq!(bus.rx_unacked(0), 2048);
        assert_eq!(bus.inject_rx(0, &[0xBB]), 0);
    }

    #[test]
    fn open_selects_status_from_protocol() {
        let mut bus = SoftwareBus::new(ChipVariant::W5100);
        let base = ChipVariant::W5100.socket_register_base();
        let mr = regs::socket_register(base, 2, sn::MR);
        let cr = regs::socket_register(base, 2, sn::CR);
        write(&mut bus, &w5100::header(Direction::Write, mr), &[SocketMode::UDP.raw()]);
        write(&mut bus, &w5100::header(Direction::Write, cr), &[SocketCommand::Open as u8]);
        assert_eq!(bus.status(2), SocketStatus::Udp);
        assert_eq!(bus.commands(2), &[SocketCommand::Open]);
    }
}

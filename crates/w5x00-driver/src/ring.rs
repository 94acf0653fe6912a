//! Ring-buffer I/O
//!
//! Each socket has a TX and an RX ring in chip memory. The chip publishes
//! free-running 16-bit pointers; the driver maps them into the ring with the
//! capability mask and splits copies that cross the end of the ring, unless
//! the bus resolves the wrap itself (W5500).
//!
//! Receive batches acknowledgements: `Sn_RX_RD` is written and RECV issued
//! only once [`ACK_THRESHOLD`] bytes have been consumed or the cached pending
//! count drains to zero.

use crate::backend::{ChipBackend, Transaction};
use crate::clock::Clock;
use crate::error::Result;
use crate::registers::Registers;
use crate::socket::{Received, SocketDriver, SocketId};
use std::net::Ipv4Addr;
use tracing::{debug, trace, warn};
use w5x00_chip::regs::{sn, sn_ir};
use w5x00_chip::{SocketCommand, SocketStatus};

/// Consumed bytes that force an acknowledgement to the chip
pub const ACK_THRESHOLD: u16 = 250;

/// Copy `buf.len()` bytes out of socket `socket`'s RX ring starting at
/// free-running pointer `pointer`
pub(crate) fn read_data<C: ChipBackend + ?Sized>(
    chip: &mut C,
    socket: u8,
    pointer: u16,
    buf: &mut [u8],
) -> Result<()> {
    let caps = *chip.capabilities();
    let offset = pointer & caps.buffer_mask();
    let addr = chip.rx_base(socket) + offset;
    let room = usize::from(caps.buffer_size - offset);
    if chip.has_offset_address_mapping() || buf.len() <= room {
        chip.read(addr, buf)
    } else {
        let (tail, head) = buf.split_at_mut(room);
        chip.read(addr, tail)?;
        chip.read(chip.rx_base(socket), head)
    }
}

/// Copy `data` into socket `socket`'s TX ring at `Sn_TX_WR + offset` and
/// advance `Sn_TX_WR` past it
pub(crate) fn write_data<C: ChipBackend + ?Sized>(
    chip: &mut C,
    socket: u8,
    offset: u16,
    data: &[u8],
) -> Result<()> {
    let caps = *chip.capabilities();
    let pointer = chip.read_sn_u16(socket, sn::TX_WR)?.wrapping_add(offset);
    let ring_offset = pointer & caps.buffer_mask();
    let addr = chip.tx_base(socket) + ring_offset;
    let room = usize::from(caps.buffer_size - ring_offset);
    if chip.has_offset_address_mapping() || data.len() <= room {
        chip.write(addr, data)?;
    } else {
        let (tail, head) = data.split_at(room);
        chip.write(addr, tail)?;
        chip.write(chip.tx_base(socket), head)?;
    }
    chip.write_sn_u16(socket, sn::TX_WR, pointer.wrapping_add(data.len() as u16))
}

impl<C: ChipBackend, K: Clock> SocketDriver<C, K> {
    // ── Receive ─────────────────────────────────────────────────────────────

    /// Receive up to `buf.len()` bytes
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure, stuck command or unsettled counter.
    pub fn recv(&mut self, id: SocketId, buf: &mut [u8]) -> Result<Received> {
        let len = buf.len();
        self.receive(id, len, Some(buf))
    }

    /// Consume up to `len` bytes without copying them out
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure, stuck command or unsettled counter.
    pub fn discard(&mut self, id: SocketId, len: usize) -> Result<Received> {
        self.receive(id, len, None)
    }

    fn receive(&mut self, id: SocketId, len: usize, mut dest: Option<&mut [u8]>) -> Result<Received> {
        let Some(s) = self.index(id) else {
            return Ok(Received::Closed);
        };
        let polls = self.config.command_poll_limit;
        let mut tx = Transaction::begin(&mut self.chip)?;
        let slot = &mut self.slots[usize::from(s)];

        if usize::from(slot.rx_pending) < len {
            let received = tx.rx_received(s)?;
            slot.rx_pending = received.saturating_sub(slot.rx_unacked);
        }
        if slot.rx_pending == 0 {
            let status = tx.socket_status(s)?;
            return Ok(if status.is_end_of_stream() {
                Received::Closed
            } else {
                Received::WouldBlock
            });
        }

        let n = len.min(usize::from(slot.rx_pending));
        if n == 0 {
            return Ok(Received::Data(0));
        }
        if let Some(buf) = dest.as_deref_mut() {
            read_data(&mut *tx, s, slot.rx_read_pointer, &mut buf[..n])?;
        }
        let n16 = n as u16;
        slot.rx_read_pointer = slot.rx_read_pointer.wrapping_add(n16);
        slot.rx_pending -= n16;

        let unacked = slot.rx_unacked + n16;
        if unacked >= ACK_THRESHOLD || slot.rx_pending == 0 {
            tx.write_sn_u16(s, sn::RX_RD, slot.rx_read_pointer)?;
            tx.exec_socket_command(s, SocketCommand::Recv, polls)?;
            slot.rx_unacked = 0;
            trace!("{id}: acknowledged up to {:#06x}", slot.rx_read_pointer);
        } else {
            slot.rx_unacked = unacked;
        }
        Ok(Received::Data(n))
    }

    /// Bytes ready to read
    ///
    /// Answers from the cache while it is non-zero; polls the chip only when
    /// the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or unsettled counter.
    pub fn recv_available(&mut self, id: SocketId) -> Result<u16> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        let slot = &mut self.slots[usize::from(s)];
        if slot.rx_pending == 0 {
            let received = Transaction::begin(&mut self.chip)?.rx_received(s)?;
            slot.rx_pending = received.saturating_sub(slot.rx_unacked);
        }
        Ok(slot.rx_pending)
    }

    /// Next unread byte, without consuming it or checking that one exists
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn peek(&mut self, id: SocketId) -> Result<u8> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        let pointer = self.slots[usize::from(s)].rx_read_pointer;
        let mut byte = [0u8; 1];
        let mut tx = Transaction::begin(&mut self.chip)?;
        read_data(&mut *tx, s, pointer, &mut byte)?;
        Ok(byte[0])
    }

    // ── Transmit ────────────────────────────────────────────────────────────

    /// TX free space, or 0 unless the connection can send
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or unsettled counter.
    pub fn send_available(&mut self, id: SocketId) -> Result<u16> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        let (free, status) = {
            let mut tx = Transaction::begin(&mut self.chip)?;
            (tx.tx_free(s)?, tx.socket_status(s)?)
        };
        self.slots[usize::from(s)].tx_free = free;
        Ok(if status.can_send() { free } else { 0 })
    }

    /// Send `data` (clamped to the ring size) on a TCP connection
    ///
    /// Waits until the TX ring has room, queues as much of the data as fits,
    /// issues SEND and waits for SEND_OK. Returns the number of bytes sent,
    /// which is less than `data.len()` when the ring was short of space.
    /// Returns 0 if the connection dropped, or if the configured send timeout
    /// ran out with the ring still full or SEND unacknowledged (the socket is
    /// closed in that case).
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure, stuck command or unsettled counter.
    pub fn send(&mut self, id: SocketId, data: &[u8]) -> Result<usize> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        let len = data.len().min(usize::from(self.chip.capabilities().buffer_size));
        let timeout = self.config.send_timeout;
        let polls = self.config.command_poll_limit;

        let start = self.clock.now();
        let len = loop {
            let (free, status) = {
                let mut tx = Transaction::begin(&mut self.chip)?;
                (tx.tx_free(s)?, tx.socket_status(s)?)
            };
            self.slots[usize::from(s)].tx_free = free;
            if !status.can_send() {
                debug!("{id}: send abandoned, socket is {status}");
                return Ok(0);
            }
            if usize::from(free) >= len {
                break len;
            }
            if free > 0 {
                debug!("{id}: {free} of {len} bytes fit, sending partial");
                break usize::from(free);
            }
            if self.clock.since(start) >= timeout {
                warn!("{id}: TX ring still full after {timeout:?}, closing");
                self.close(id)?;
                return Ok(0);
            }
            self.clock.yield_now();
        };

        {
            let mut tx = Transaction::begin(&mut self.chip)?;
            write_data(&mut *tx, s, 0, &data[..len])?;
            tx.exec_socket_command(s, SocketCommand::Send, polls)?;
        }

        let start = self.clock.now();
        loop {
            let done = {
                let mut tx = Transaction::begin(&mut self.chip)?;
                if tx.read_sn_u8(s, sn::IR)? & sn_ir::SEND_OK != 0 {
                    tx.write_sn_u8(s, sn::IR, sn_ir::SEND_OK)?;
                    true
                } else if tx.socket_status(s)? == SocketStatus::Closed {
                    debug!("{id}: closed while sending");
                    return Ok(0);
                } else {
                    false
                }
            };
            if done {
                trace!("{id}: sent {len} bytes");
                return Ok(len);
            }
            if self.clock.since(start) >= timeout {
                warn!("{id}: SEND not acknowledged after {timeout:?}, closing");
                self.close(id)?;
                return Ok(0);
            }
            self.clock.yield_now();
        }
    }

    /// Queue `data` at `offset` past `Sn_TX_WR` without sending
    ///
    /// Writes at most what fits in the current free space beyond `offset`
    /// and returns the count written. Used to assemble UDP datagrams ahead
    /// of [`Self::send_udp`].
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or unsettled counter.
    pub fn buffer_data(&mut self, id: SocketId, offset: u16, data: &[u8]) -> Result<usize> {
        let Some(s) = self.index(id) else {
            return Ok(0);
        };
        let mut tx = Transaction::begin(&mut self.chip)?;
        let free = tx.tx_free(s)?;
        self.slots[usize::from(s)].tx_free = free;
        let n = data.len().min(usize::from(free.saturating_sub(offset)));
        if n < data.len() {
            debug!("{id}: buffering {n} of {} bytes", data.len());
        }
        write_data(&mut *tx, s, offset, &data[..n])?;
        Ok(n)
    }

    // ── UDP ─────────────────────────────────────────────────────────────────

    /// Set the destination of the next datagram
    ///
    /// Returns `false` (and programs nothing) for the unspecified address or
    /// port 0.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn start_udp(&mut self, id: SocketId, ip: Ipv4Addr, port: u16) -> Result<bool> {
        let Some(s) = self.index(id) else {
            return Ok(false);
        };
        if ip.is_unspecified() || port == 0 {
            debug!("{id}: invalid UDP destination {ip}:{port}");
            return Ok(false);
        }
        let mut tx = Transaction::begin(&mut self.chip)?;
        tx.write_sn_bytes(s, sn::DIPR, &ip.octets())?;
        tx.write_sn_u16(s, sn::DPORT, port)?;
        Ok(true)
    }

    /// Send the datagram assembled with [`Self::buffer_data`]
    ///
    /// `false` if the chip reports TIMEOUT (ARP failed) or the send timeout
    /// runs out.
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure or stuck command.
    pub fn send_udp(&mut self, id: SocketId) -> Result<bool> {
        let Some(s) = self.index(id) else {
            return Ok(false);
        };
        let timeout = self.config.send_timeout;
        let polls = self.config.command_poll_limit;
        Transaction::begin(&mut self.chip)?.exec_socket_command(s, SocketCommand::Send, polls)?;

        let start = self.clock.now();
        loop {
            {
                let mut tx = Transaction::begin(&mut self.chip)?;
                let ir = tx.read_sn_u8(s, sn::IR)?;
                if ir & sn_ir::SEND_OK != 0 {
                    tx.write_sn_u8(s, sn::IR, sn_ir::SEND_OK)?;
                    return Ok(true);
                }
                if ir & sn_ir::TIMEOUT != 0 {
                    tx.write_sn_u8(s, sn::IR, sn_ir::SEND_OK | sn_ir::TIMEOUT)?;
                    debug!("{id}: datagram timed out");
                    return Ok(false);
                }
            }
            if self.clock.since(start) >= timeout {
                warn!("{id}: datagram not acknowledged after {timeout:?}");
                return Ok(false);
            }
            self.clock.yield_now();
        }
    }
}

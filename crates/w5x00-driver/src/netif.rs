//! Interface addressing and retransmission settings
//!
//! Thin accessors over the common register block. The DNS server is held by
//! the driver only.

use crate::backend::{ChipBackend, Transaction};
use crate::capabilities::LinkStatus;
use crate::clock::Clock;
use crate::config::NetConfig;
use crate::error::Result;
use crate::registers::Registers;
use crate::socket::SocketDriver;
use std::net::Ipv4Addr;
use tracing::info;
use w5x00_chip::regs;

/// Largest retransmission timeout the 100 µs `RTR` register can hold
pub const MAX_RETRANSMISSION_TIMEOUT_MS: u16 = 6553;

impl<C: ChipBackend, K: Clock> SocketDriver<C, K> {
    /// Program MAC, IP, gateway and subnet; remember the DNS server
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn configure(&mut self, net: &NetConfig) -> Result<()> {
        {
            let mut tx = Transaction::begin(&mut self.chip)?;
            tx.write(regs::SHAR, &net.mac)?;
            tx.write(regs::SIPR, &net.ip.octets())?;
            tx.write(regs::GAR, &net.gateway.octets())?;
            tx.write(regs::SUBR, &net.subnet.octets())?;
        }
        self.dns = net.dns;
        info!(
            "Interface {} / {} via {}, dns {}",
            net.ip, net.subnet, net.gateway, net.dns
        );
        Ok(())
    }

    /// Source MAC address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn mac_address(&mut self) -> Result<[u8; 6]> {
        let mut mac = [0u8; 6];
        Transaction::begin(&mut self.chip)?.read(regs::SHAR, &mut mac)?;
        Ok(mac)
    }

    /// Set the source MAC address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_mac_address(&mut self, mac: [u8; 6]) -> Result<()> {
        Transaction::begin(&mut self.chip)?.write(regs::SHAR, &mac)
    }

    /// Local IP address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn local_ip(&mut self) -> Result<Ipv4Addr> {
        self.read_address(regs::SIPR)
    }

    /// Set the local IP address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_local_ip(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.write_address(regs::SIPR, ip)
    }

    /// Gateway address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn gateway_ip(&mut self) -> Result<Ipv4Addr> {
        self.read_address(regs::GAR)
    }

    /// Set the gateway address
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_gateway_ip(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.write_address(regs::GAR, ip)
    }

    /// Subnet mask
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn subnet_mask(&mut self) -> Result<Ipv4Addr> {
        self.read_address(regs::SUBR)
    }

    /// Set the subnet mask
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_subnet_mask(&mut self, mask: Ipv4Addr) -> Result<()> {
        self.write_address(regs::SUBR, mask)
    }

    /// DNS server from the last [`Self::configure`]
    pub fn dns_server(&self) -> Ipv4Addr {
        self.dns
    }

    /// Set the TCP retransmission timeout in milliseconds (max 6553)
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_retransmission_timeout(&mut self, ms: u16) -> Result<()> {
        let ticks = ms.min(MAX_RETRANSMISSION_TIMEOUT_MS) * 10;
        let addr = self.chip.variant().rtr();
        Transaction::begin(&mut self.chip)?.write_u16(addr, ticks)
    }

    /// Set how many times the chip retransmits before giving up
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn set_retransmission_count(&mut self, count: u8) -> Result<()> {
        let addr = self.chip.variant().rcr();
        Transaction::begin(&mut self.chip)?.write_u8(addr, count)
    }

    /// PHY link state
    ///
    /// # Errors
    ///
    /// Returns error on a bus failure.
    pub fn link_status(&mut self) -> Result<LinkStatus> {
        self.chip.link_status(&mut self.clock)
    }

    fn read_address(&mut self, addr: u16) -> Result<Ipv4Addr> {
        let mut octets = [0u8; 4];
        Transaction::begin(&mut self.chip)?.read(addr, &mut octets)?;
        Ok(Ipv4Addr::from(octets))
    }

    fn write_address(&mut self, addr: u16, ip: Ipv4Addr) -> Result<()> {
        Transaction::begin(&mut self.chip)?.write(addr, &ip.octets())
    }
}

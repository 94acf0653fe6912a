//! Driver and network configuration

use crate::error::{Result, W5x00Error};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Timing budgets for the driver's polling loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Upper bound on waiting for TX space and for SEND completion
    pub send_timeout: Duration,

    /// Default budget for `connect`
    pub connect_timeout: Duration,

    /// Default budget for the graceful half of `stop`
    pub stop_timeout: Duration,

    /// Reads of `Sn_CR` before a command is declared stuck
    pub command_poll_limit: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(1),
            command_poll_limit: 10_000,
        }
    }
}

impl DriverConfig {
    /// Override the send timeout
    #[must_use]
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Override the default connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the default stop timeout
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Override the command poll budget
    #[must_use]
    pub const fn with_command_poll_limit(mut self, polls: u32) -> Self {
        self.command_poll_limit = polls;
        self
    }

    /// Reject budgets that would make every command or send fail at once
    ///
    /// # Errors
    ///
    /// Returns [`W5x00Error::InvalidConfig`] for a zero command poll budget
    /// or a zero send timeout.
    pub fn validate(&self) -> Result<()> {
        if self.command_poll_limit == 0 {
            return Err(W5x00Error::invalid_config("command_poll_limit must be at least 1"));
        }
        if self.send_timeout.is_zero() {
            return Err(W5x00Error::invalid_config("send_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Interface addressing
///
/// Built from MAC and IP; gateway and DNS default to the `.1` host of the
/// local network, subnet to a /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    /// Source hardware address
    pub mac: [u8; 6],
    /// Local IPv4 address
    pub ip: Ipv4Addr,
    /// Default gateway
    pub gateway: Ipv4Addr,
    /// Subnet mask
    pub subnet: Ipv4Addr,
    /// DNS server (kept by the driver; the chip has no such register)
    pub dns: Ipv4Addr,
}

impl NetConfig {
    /// Addressing for `ip` with derived gateway, subnet and DNS
    pub fn new(mac: [u8; 6], ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        let dot_one = Ipv4Addr::new(a, b, c, 1);
        Self {
            mac,
            ip,
            gateway: dot_one,
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            dns: dot_one,
        }
    }

    /// Override the gateway
    #[must_use]
    pub const fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = gateway;
        self
    }

    /// Override the subnet mask
    #[must_use]
    pub const fn with_subnet(mut self, subnet: Ipv4Addr) -> Self {
        self.subnet = subnet;
        self
    }

    /// Override the DNS server
    #[must_use]
    pub const fn with_dns(mut self, dns: Ipv4Addr) -> Self {
        self.dns = dns;
        self
    }
}

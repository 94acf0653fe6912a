//! Ephemeral source ports
//!
//! Sockets opened with port 0 get the next value from a counter confined to
//! the IANA dynamic range. The counter is seeded from the clock so restarts
//! do not reuse the previous run's ports straight away.

/// First port of the dynamic range
pub const EPHEMERAL_START: u16 = 49152;

/// Seed bits mixed into the counter
const SEED_MASK: u16 = 0x3FFF;

/// Counter over 49152..=65535
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemeralPorts {
    last: u16,
}

impl EphemeralPorts {
    /// Counter seeded from a microsecond timestamp
    pub const fn seeded(micros: u64) -> Self {
        Self {
            last: EPHEMERAL_START ^ (micros as u16 & SEED_MASK),
        }
    }

    /// Mix extra entropy into the counter
    pub fn reseed(&mut self, entropy: u16) {
        self.last ^= entropy & SEED_MASK;
    }

    /// Hand out the next port
    pub fn next_port(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1).max(EPHEMERAL_START);
        self.last
    }

    /// Most recently issued port (or the seed)
    pub const fn last(&self) -> u16 {
        self.last
    }
}

impl Default for EphemeralPorts {
    fn default() -> Self {
        Self::seeded(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_stays_in_range() {
        for micros in [0u64, 1, 0x3FFF, 0xFFFF, u64::MAX] {
            assert!(EphemeralPorts::seeded(micros).last() >= EPHEMERAL_START);
        }
    }

    #[test]
    fn wraps_back_to_range_start() {
        let mut ports = EphemeralPorts::seeded(0x3FFE);
        assert_eq!(ports.last(), 0xFFFE);
        assert_eq!(ports.next_port(), 0xFFFF);
        assert_eq!(ports.next_port(), EPHEMERAL_START);
        assert_eq!(ports.next_port(), EPHEMERAL_START + 1);
    }

    #[test]
    fn every_port_is_dynamic() {
        let mut ports = EphemeralPorts::seeded(12345);
        for _ in 0..70_000 {
            assert!(ports.next_port() >= EPHEMERAL_START);
        }
    }

    #[test]
    fn reseed_only_touches_low_bits() {
        let mut ports = EphemeralPorts::default();
        ports.reseed(0xFFFF);
        assert_eq!(ports.last(), 0xFFFF);
        ports.reseed(0x3FFF);
        assert_eq!(ports.last(), EPHEMERAL_START);
    }
}

//! Error types for W5x00 driver operations
//!
//! Socket-level outcomes (no free slot, connect timeout, peer closed) are
//! ordinary return values. These errors cover the machinery underneath: a
//! chip that never answers, a bus that fails, a register that never settles.

use thiserror::Error;
use w5x00_chip::ChipVariant;

/// Result type alias for W5x00 operations
pub type Result<T> = std::result::Result<T, W5x00Error>;

/// Errors that can occur during W5x00 operations
#[derive(Debug, Error)]
pub enum W5x00Error {
    /// Soft reset never settled and the mode register looks undriven
    #[error("No {variant} responding (mode register reads {mode_register:#04x})")]
    ChipNotPresent {
        /// Variant that was probed
        variant: ChipVariant,
        /// Last value read from MR
        mode_register: u8,
    },

    /// Chip answers but is stuck in soft reset
    #[error("{variant} present but still in reset after {attempts} polls")]
    ChipBusy {
        /// Variant that was probed
        variant: ChipVariant,
        /// Number of polls made
        attempts: u32,
    },

    /// Bus transfer failed
    #[error("Bus transfer failed: {reason}")]
    Bus {
        /// Reason for failure
        reason: String,
    },

    /// I/O error from an OS-backed bus
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Socket command register never returned to zero
    #[error("Socket {socket}: command {command:#04x} not accepted after {polls} polls")]
    CommandTimeout {
        /// Socket index
        socket: u8,
        /// Raw command value
        command: u8,
        /// Number of polls made
        polls: u32,
    },

    /// Free-running counter kept changing between reads
    #[error("Socket {socket}: {register} did not settle after {reads} reads")]
    UnstableCounter {
        /// Socket index
        socket: u8,
        /// Register name
        register: &'static str,
        /// Number of reads made
        reads: u32,
    },

    /// Configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },
}

impl W5x00Error {
    /// Create a bus error
    pub fn bus(reason: impl Into<String>) -> Self {
        Self::Bus {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error means no usable chip was found at init
    pub const fn is_init_failure(&self) -> bool {
        matches!(self, Self::ChipNotPresent { .. } | Self::ChipBusy { .. })
    }
}

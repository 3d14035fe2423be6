//! Configuration options for the USB transport

use std::time::Duration;

use crate::consts::{CHUNK_SIZE, TRANSFER_TIMEOUT};

/// Configuration options for the USB transport
///
/// The defaults reproduce the reader's wire contract; the knobs exist
/// for the few constants that have varied across driver revisions
/// (chunking, echo validation) and for test setups.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum bytes per bulk transfer
    pub chunk_size: usize,

    /// Timeout applied to every foreground transfer
    pub timeout: Duration,

    /// Verify that the power-up handshake is echoed verbatim
    pub verify_handshake_echo: bool,

    /// Interrupt-poll granularity of the presence monitor; also the
    /// upper bound on how long cancellation can take
    pub presence_poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            timeout: TRANSFER_TIMEOUT,
            verify_handshake_echo: true,
            presence_poll_interval: Duration::from_millis(500),
        }
    }
}

impl TransportConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bulk chunk size
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the per-transfer timeout
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set whether the handshake echo is verified
    pub const fn with_verify_handshake_echo(mut self, verify: bool) -> Self {
        self.verify_handshake_echo = verify;
        self
    }

    /// Set the presence-poll granularity
    pub const fn with_presence_poll_interval(mut self, interval: Duration) -> Self {
        self.presence_poll_interval = interval;
        self
    }
}

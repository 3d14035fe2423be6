//! Driver error taxonomy
//!
//! This module provides the centralized error type used throughout the
//! ifdlink crates. Every USB transfer outcome and protocol violation is
//! folded into this vocabulary at the point of failure and bubbles up
//! unchanged; there are no retries below the caller.

/// Result alias used throughout the ifdlink crates
pub type Result<T> = core::result::Result<T, Error>;

/// Driver result codes for all reader bridge operations
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// Generic transport or protocol failure
    #[error("communication error: {0}")]
    Communication(&'static str),

    /// Transfer did not complete within the per-transfer timeout
    #[error("response timeout")]
    ResponseTimeout,

    /// The device is no longer attached to the bus
    #[error("no such device")]
    NoSuchDevice,

    //
    // Protocol related errors
    //
    /// Power-up declared one ATR length but the bulk read returned another
    #[error("ATR length mismatch: declared {declared}, read {actual}")]
    AtrLengthMismatch {
        /// Length announced in the vendor response header
        declared: usize,
        /// Bytes actually transferred
        actual: usize,
    },

    /// The reader did not echo the power-up handshake command verbatim
    #[error("handshake echo mismatch")]
    HandshakeMismatch,

    /// Command length matches no ISO 7816-4 case
    #[error("malformed command: length {0} matches no ISO 7816-4 case")]
    MalformedCommand(usize),

    //
    // Operation related errors
    //
    /// Operation is intentionally unimplemented for this reader
    #[error("operation not supported")]
    NotSupported,

    /// Capability tag outside the supported set
    #[error("unknown capability tag {0:#06x}")]
    UnknownTag(u32),

    /// Reserved classification for power-sequence failures
    #[error("power action failed")]
    PowerAction,
}

impl Error {
    /// Whether this error folds into the generic communication class
    /// when reported to callers that only distinguish the coarse
    /// result codes
    pub const fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::Communication(_)
                | Self::AtrLengthMismatch { .. }
                | Self::HandshakeMismatch
                | Self::MalformedCommand(_)
        )
    }
}

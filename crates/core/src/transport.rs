//! Message-channel seam between the framer and a concrete transport
//!
//! The vendor protocol moves whole messages of known length, not single
//! APDUs. Implementors handle the announce/chunk mechanics; the framer
//! only sees complete messages.

use bytes::Bytes;
use std::fmt;

use crate::error::Result;

/// Trait for length-announced message exchange with the reader
///
/// A channel moves one message at a time per direction; no new message
/// is begun until the previous one in the same direction has fully
/// completed.
pub trait MessageChannel: fmt::Debug + Send {
    /// Send one complete message
    fn write_message(&mut self, message: &[u8]) -> Result<()>;

    /// Receive exactly `expected` bytes as one message
    ///
    /// Implementations accumulate partial transfers until the expected
    /// total is reached; on error no partial message is returned.
    fn read_message(&mut self, expected: usize) -> Result<Bytes>;
}

//! Transport-independent APDU machinery for the ifdlink reader bridge
//!
//! This crate holds everything about the vendor exchange protocol that
//! does not touch USB: the driver error taxonomy, the ISO 7816-4
//! case-length table, the message-channel seam, and the transaction
//! framer that drives a channel through the header/procedure-byte/data
//! sequence.
//!
//! ## Overview
//!
//! The reader speaks a T=0-style protocol over length-announced
//! messages. A transport crate implements [`MessageChannel`]; callers
//! hand raw command bytes to [`framer::transmit`] and get back either
//! the 2-byte status pair or the response data followed by the status
//! pair.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

// Main modules
pub mod apdu;
pub mod error;
pub mod framer;
pub mod transport;

pub use apdu::{CaseLengths, HEADER_LEN, MAX_SHORT_RESPONSE, SW1_WRONG_LENGTH};
pub use error::{Error, Result};
pub use transport::MessageChannel;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    // Core types
    pub use crate::{Bytes, BytesMut, Error, Result};

    // Case-length machinery
    pub use crate::apdu::{CaseLengths, HEADER_LEN, MAX_SHORT_RESPONSE, SW1_WRONG_LENGTH};

    // Framing
    pub use crate::framer::transmit;
    pub use crate::transport::MessageChannel;
}

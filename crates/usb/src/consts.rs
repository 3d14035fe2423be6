//! Wire-level contract with the reader
//!
//! Every value here is part of the vendor protocol and must be
//! preserved bit-exactly.

use std::time::Duration;

/// USB vendor identifier of the reader
pub const VENDOR_ID: u16 = 0x1307;

/// USB product identifier of the reader
pub const PRODUCT_ID: u16 = 0x0361;

/// Claimed interface number
pub const INTERFACE: u8 = 1;

/// Bulk OUT endpoint carrying message payloads to the reader
pub const BULK_OUT_ENDPOINT: u8 = 0x05;

/// Bulk IN endpoint carrying message payloads from the reader
pub const BULK_IN_ENDPOINT: u8 = 0x86;

/// Interrupt IN endpoint delivering card-presence notifications
pub const INTERRUPT_IN_ENDPOINT: u8 = 0x84;

/// Timeout applied to every foreground transfer
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Maximum bytes moved per bulk transfer
pub const CHUNK_SIZE: usize = 16;

/// Upper bound on a cached ATR
pub const MAX_ATR_SIZE: usize = 33;

/// Filler for control-transfer parameters the protocol does not use
pub const PARAM_UNUSED: u16 = 0xFFFF;

/// Vendor control request codes
pub mod request {
    /// Announce the total length of the next bulk-out message
    pub const ANNOUNCE_WRITE: u8 = 192;
    /// Announce the expected length of the next bulk-in message
    pub const ANNOUNCE_READ: u8 = 193;
    /// Fetch the ATR header; the first response byte is the ATR length
    pub const FETCH_ATR: u8 = 161;
    /// Finalize a power-up sequence
    pub const FINALIZE_POWER: u8 = 165;
}

/// Fixed command the reader must echo verbatim during power-up
pub const HANDSHAKE_COMMAND: [u8; 4] = [0xFF, 0x10, 0x13, 0xFC];

/// Payload of the finalize-power-up control transfer
pub const FINALIZE_PAYLOAD: [u8; 2] = [0x00, 0x13];

//! USB transport for the ifdlink reader bridge
//!
//! This crate speaks the reader's vendor USB protocol: length-announce
//! control transfers followed by chunked bulk messages, an interrupt
//! endpoint for card presence, and the power-up handshake that yields
//! the ATR. It plugs the [`MessageChannel`] seam of
//! [`ifdlink_apdu_core`] so the APDU sequencing layer never sees USB.
//!
//! # Example
//!
//! ```no_run
//! use ifdlink_transport_usb::{PowerAction, UsbReader};
//!
//! # fn main() -> ifdlink_apdu_core::Result<()> {
//! let mut reader = UsbReader::open()?;
//! let atr = reader.power(PowerAction::PowerUp)?;
//! println!("ATR: {}", hex::encode(&atr));
//!
//! let response = reader.transmit(&[0x00, 0xA4, 0x04, 0x00])?;
//! println!("response: {}", hex::encode(&response));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use ifdlink_apdu_core::{Error, MessageChannel, Result};

mod bus;
pub mod config;
pub mod consts;
mod error;
mod monitor;
mod reader;
mod transport;

pub use bus::{RusbBus, UsbBus};
pub use config::TransportConfig;
pub use monitor::{CardPresence, PresenceReceiver, SharedPresence};
pub use reader::{tag, Capability, PowerAction, UsbReader};
pub use transport::UsbMessageTransport;

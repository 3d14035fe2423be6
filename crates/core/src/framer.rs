//! T=0 transaction sequencing over a message channel
//!
//! Drives a [`MessageChannel`] through the reader's exchange protocol:
//! header message, procedure byte, optional data message and second
//! procedure byte, then either the two status bytes or the full
//! response. Any channel failure aborts the sequence; the caller never
//! sees a partially filled response.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::apdu::{CaseLengths, HEADER_LEN, MAX_SHORT_RESPONSE, SW1_WRONG_LENGTH};
use crate::error::{Error, Result};
use crate::transport::MessageChannel;

/// Perform one full APDU exchange.
///
/// Returns the card's response: either the 2-byte status pair or the
/// response data followed by the status pair, per the command's case.
pub fn transmit<C: MessageChannel>(channel: &mut C, command: &[u8]) -> Result<Bytes> {
    let lengths = CaseLengths::from_command(command)?;
    let p3 = command.get(4).copied().unwrap_or(0) as usize;

    trace!(
        command = %hex::encode(command),
        lc = lengths.lc,
        le = lengths.le,
        "transmitting APDU"
    );

    // The header always goes out as a full 5-byte message; short
    // commands are zero-padded.
    let mut header = [0u8; HEADER_LEN];
    let head = command.len().min(HEADER_LEN);
    header[..head].copy_from_slice(&command[..head]);
    channel.write_message(&header)?;
    let mut procedure = read_procedure_byte(channel)?;

    if lengths.lc > 0 {
        channel.write_message(&command[HEADER_LEN..HEADER_LEN + lengths.lc])?;
        procedure = read_procedure_byte(channel)?;
    }

    let response = if lengths.le == 0 || procedure == SW1_WRONG_LENGTH {
        // Status pair only: the procedure byte already holds SW1.
        let sw2 = read_procedure_byte(channel)?;
        let mut status = BytesMut::with_capacity(2);
        status.put_u8(procedure);
        status.put_u8(sw2);
        status.freeze()
    } else {
        // P3 data bytes plus the status pair; a bare header with
        // P3 = 0 asked for the maximum short response.
        let expected = if command.len() == HEADER_LEN && p3 == 0 {
            MAX_SHORT_RESPONSE
        } else {
            p3 + 2
        };
        channel.read_message(expected)?
    };

    trace!(response = %hex::encode(&response), "APDU exchange complete");
    Ok(response)
}

fn read_procedure_byte<C: MessageChannel>(channel: &mut C) -> Result<u8> {
    let byte = channel.read_message(1).inspect_err(|err| {
        debug!(error = %err, "procedure byte read failed");
    })?;
    byte.first()
        .copied()
        .ok_or(Error::Communication("empty procedure byte read"))
}

//! ISO 7816-4 case-length computation
//!
//! A T=0 command carries its data length (Lc) and expected response
//! length (Le) implicitly, through the total command length and the P3
//! byte. This module recovers both from the raw command bytes.

use crate::error::{Error, Result};

/// Length of an on-the-wire command header (CLA, INS, P1, P2, P3)
pub const HEADER_LEN: usize = 5;

/// SW1 value signalling a wrong-length condition; the card follows it
/// with a single corrective byte instead of a data phase
pub const SW1_WRONG_LENGTH: u8 = 0x6C;

/// Largest short-form response: 256 data bytes plus the status pair
pub const MAX_SHORT_RESPONSE: usize = 258;

/// Command-data and expected-response lengths implied by an APDU case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseLengths {
    /// Number of command data bytes following the header
    pub lc: usize,
    /// Number of response data bytes the card is expected to return
    pub le: usize,
}

impl CaseLengths {
    /// Determine (Lc, Le) from a raw command per the ISO 7816-4 case
    /// table.
    ///
    /// With `L` the number of bytes past the 4-byte header and `P3`
    /// the byte at offset 4 (zero when absent):
    ///
    /// - `L = 0` — case 1, no data either direction.
    /// - `L = 1` — case 2, response only; `P3 = 0` encodes 256.
    /// - `L = 1 + P3`, `P3 ≠ 0` — case 3, command data only.
    /// - `L = 2 + P3`, `P3 ≠ 0` — case 4, both directions; a trailing
    ///   zero byte encodes 256.
    ///
    /// Any other length matches no case and is rejected as
    /// [`Error::MalformedCommand`].
    pub fn from_command(command: &[u8]) -> Result<Self> {
        if command.len() < 4 {
            return Err(Error::MalformedCommand(command.len()));
        }

        let l = command.len() - 4;
        let p3 = command.get(4).copied().unwrap_or(0) as usize;

        match l {
            0 => Ok(Self { lc: 0, le: 0 }),
            1 => Ok(Self {
                lc: 0,
                le: if p3 == 0 { 256 } else { p3 },
            }),
            _ if p3 != 0 && l == 1 + p3 => Ok(Self { lc: p3, le: 0 }),
            _ if p3 != 0 && l == 2 + p3 => {
                let trailing = command[command.len() - 1] as usize;
                Ok(Self {
                    lc: p3,
                    le: if trailing == 0 { 256 } else { trailing },
                })
            }
            _ => Err(Error::MalformedCommand(command.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_1_header_only() {
        let lengths = CaseLengths::from_command(&[0x00, 0xA4, 0x00, 0x00]).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 0, le: 0 });
    }

    #[test]
    fn case_2_response_only() {
        // P3 = 0 encodes the maximum response length
        let lengths = CaseLengths::from_command(&[0x00, 0xB0, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 0, le: 256 });

        let lengths = CaseLengths::from_command(&[0x00, 0xB0, 0x00, 0x00, 0x05]).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 0, le: 5 });
    }

    #[test]
    fn case_3_command_data_only() {
        let command = [0x00, 0xD6, 0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
        let lengths = CaseLengths::from_command(&command).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 4, le: 0 });
    }

    #[test]
    fn case_4_both_directions() {
        let command = [0x00, 0xA4, 0x04, 0x00, 0x02, 0x3F, 0x00, 0x00];
        let lengths = CaseLengths::from_command(&command).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 2, le: 256 });

        let command = [0x00, 0xA4, 0x04, 0x00, 0x02, 0x3F, 0x00, 0x10];
        let lengths = CaseLengths::from_command(&command).unwrap();
        assert_eq!(lengths, CaseLengths { lc: 2, le: 16 });
    }

    #[test]
    fn rejects_lengths_matching_no_case() {
        // Too short for a header
        assert_eq!(
            CaseLengths::from_command(&[0x00, 0xA4]),
            Err(Error::MalformedCommand(2))
        );

        // P3 = 3 but only two data bytes follow
        let command = [0x00, 0xD6, 0x00, 0x00, 0x03, 0x01, 0x02];
        assert_eq!(
            CaseLengths::from_command(&command),
            Err(Error::MalformedCommand(7))
        );

        // P3 = 0 cannot introduce a data phase
        let command = [0x00, 0xD6, 0x00, 0x00, 0x00, 0x01, 0x02];
        assert_eq!(
            CaseLengths::from_command(&command),
            Err(Error::MalformedCommand(7))
        );
    }
}

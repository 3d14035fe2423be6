//! Chunked message transport over the vendor bulk endpoints
//!
//! Every message is preceded by a control transfer announcing its
//! length in `wIndex`, then moved in bulk chunks of at most the
//! configured capacity. No frame is begun until the previous one in
//! the same direction has completed.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use ifdlink_apdu_core::{Error, MessageChannel, Result};

use crate::bus::UsbBus;
use crate::config::TransportConfig;
use crate::consts::{request, PARAM_UNUSED};

/// [`MessageChannel`] implementation over a [`UsbBus`]
#[derive(Debug)]
pub struct UsbMessageTransport<B: UsbBus> {
    bus: B,
    config: TransportConfig,
}

impl<B: UsbBus> UsbMessageTransport<B> {
    /// Create a transport over the given bus
    pub fn new(bus: B, config: TransportConfig) -> Self {
        Self { bus, config }
    }

    /// Access the underlying bus for non-message transfers
    pub(crate) const fn bus(&self) -> &B {
        &self.bus
    }

    /// Access the transport configuration
    pub(crate) const fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl<B: UsbBus> MessageChannel for UsbMessageTransport<B> {
    fn write_message(&mut self, message: &[u8]) -> Result<()> {
        self.bus.control_out(
            request::ANNOUNCE_WRITE,
            PARAM_UNUSED,
            message.len() as u16,
            &[],
            self.config.timeout,
        )?;

        for chunk in message.chunks(self.config.chunk_size) {
            let sent = self.bus.bulk_out(chunk, self.config.timeout)?;
            if sent != chunk.len() {
                return Err(Error::Communication("short bulk write"));
            }
        }

        trace!("> {}", render_wire(message));
        Ok(())
    }

    fn read_message(&mut self, expected: usize) -> Result<Bytes> {
        self.bus.control_out(
            request::ANNOUNCE_READ,
            PARAM_UNUSED,
            expected as u16,
            &[],
            self.config.timeout,
        )?;

        let mut message = BytesMut::with_capacity(expected);
        let mut scratch = vec![0u8; self.config.chunk_size];
        while message.len() < expected {
            // Short reads are normal; only reaching the expected total
            // or an error ends the loop.
            let received = self.bus.bulk_in(&mut scratch, self.config.timeout)?;
            message.put_slice(&scratch[..received]);
        }
        message.truncate(expected);

        let message = message.freeze();
        trace!("< {}", render_wire(&message));
        Ok(message)
    }
}

/// Render a wire dump: hex pairs followed by a printable view with
/// '.' standing in for non-printable bytes.
fn render_wire(bytes: &[u8]) -> String {
    let hex = bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    let printable: String = bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!("{hex} [{printable}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::MockBus;
    use crate::consts::CHUNK_SIZE;

    fn transport(bus: MockBus) -> UsbMessageTransport<MockBus> {
        UsbMessageTransport::new(bus, TransportConfig::default())
    }

    #[test]
    fn write_announces_length_then_chunks() {
        let mut transport = transport(MockBus::default());
        let payload: Vec<u8> = (0..33).collect();

        transport.write_message(&payload).unwrap();

        let controls = transport.bus().control_out_calls.lock().unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].request, request::ANNOUNCE_WRITE);
        assert_eq!(controls[0].value, PARAM_UNUSED);
        assert_eq!(controls[0].index, 33);

        let chunks = transport.bus().bulk_out_chunks.lock().unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![16, 16, 1]);
        assert_eq!(
            chunks.iter().flatten().copied().collect::<Vec<u8>>(),
            payload
        );
    }

    #[test]
    fn write_smaller_than_a_chunk_is_a_single_transfer() {
        let mut transport = transport(MockBus::default());

        transport.write_message(&[0xFF, 0x10, 0x13, 0xFC]).unwrap();

        let chunks = transport.bus().bulk_out_chunks.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], vec![0xFF, 0x10, 0x13, 0xFC]);
    }

    #[test]
    fn failed_chunk_aborts_the_write() {
        let bus = MockBus::default();
        bus.push_bulk_out(Ok(CHUNK_SIZE));
        bus.push_bulk_out(Err(Error::ResponseTimeout));
        let mut transport = transport(bus);

        let payload = vec![0u8; 40];
        assert_eq!(
            transport.write_message(&payload),
            Err(Error::ResponseTimeout)
        );
        // The third chunk never went out
        assert_eq!(transport.bus().bulk_out_chunks.lock().unwrap().len(), 1);
    }

    #[test]
    fn short_chunk_write_is_an_error() {
        let bus = MockBus::default();
        bus.push_bulk_out(Ok(CHUNK_SIZE - 3));
        let mut transport = transport(bus);

        assert_eq!(
            transport.write_message(&[0u8; CHUNK_SIZE]),
            Err(Error::Communication("short bulk write"))
        );
    }

    #[test]
    fn read_accumulates_across_short_transfers() {
        let bus = MockBus::default();
        bus.push_bulk_in(Ok((0..7).collect()));
        bus.push_bulk_in(Ok((7..16).collect()));
        bus.push_bulk_in(Ok((16..20).collect()));
        let mut transport = transport(bus);

        let message = transport.read_message(20).unwrap();

        assert_eq!(&message[..], (0..20).collect::<Vec<u8>>().as_slice());
        let controls = transport.bus().control_out_calls.lock().unwrap();
        assert_eq!(controls[0].request, request::ANNOUNCE_READ);
        assert_eq!(controls[0].index, 20);
    }

    #[test]
    fn read_failure_returns_no_partial_message() {
        let bus = MockBus::default();
        bus.push_bulk_in(Ok(vec![0xAA; 8]));
        bus.push_bulk_in(Err(Error::NoSuchDevice));
        let mut transport = transport(bus);

        assert_eq!(transport.read_message(20), Err(Error::NoSuchDevice));
    }

    #[test]
    fn wire_rendering_marks_non_printable_bytes() {
        assert_eq!(render_wire(b"OK\x00\x90"), "4F 4B 00 90 [OK..]");
    }
}

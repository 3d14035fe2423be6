//! Reader session: channel lifecycle, power control and the host-facing
//! operation surface
//!
//! [`UsbReader`] owns the USB context and claimed device handle, runs
//! the presence monitor, and exposes the operations the smart-card
//! middleware drives: power/reset, APDU transmit, capability and
//! presence queries. Foreground calls are expected to be serialized by
//! the host; the only concurrent actor is the monitor thread, which
//! uses its own endpoint.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, error, warn};

use ifdlink_apdu_core::{framer, Error, MessageChannel, Result};

use crate::bus::{RusbBus, UsbBus};
use crate::config::TransportConfig;
use crate::consts::{
    request, CHUNK_SIZE, FINALIZE_PAYLOAD, HANDSHAKE_COMMAND, INTERFACE, MAX_ATR_SIZE,
    PARAM_UNUSED, PRODUCT_ID, VENDOR_ID,
};
use crate::monitor::{
    presence_channel, CardPresence, PresenceMonitor, PresenceReceiver, SharedPresence,
};
use crate::transport::UsbMessageTransport;

/// Power control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Power and reset the card, returning its ATR
    PowerUp,
    /// Quick reset; powers the card up if it is not already
    Reset,
    /// Power the card down (no sequence is defined for this reader)
    PowerDown,
}

/// Capability tag numbers as the host presents them
pub mod tag {
    /// Cached ATR of the powered card
    pub const ATR: u32 = 0x0303;
    /// Number of card slots
    pub const SLOTS_NUMBER: u32 = 0x0FAE;
    /// Simultaneous slot access support
    pub const SIMULTANEOUS_ACCESS: u32 = 0x0FAF;
}

/// Capability queries this reader answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Cached ATR bytes; empty before the first successful power-up
    Atr,
    /// Slot count, fixed at one
    SlotCount,
    /// Simultaneous access, fixed at unsupported
    SimultaneousAccess,
}

impl Capability {
    /// Resolve a host capability tag
    pub const fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            tag::ATR => Ok(Self::Atr),
            tag::SLOTS_NUMBER => Ok(Self::SlotCount),
            tag::SIMULTANEOUS_ACCESS => Ok(Self::SimultaneousAccess),
            other => Err(Error::UnknownTag(other)),
        }
    }
}

/// Cached Answer-To-Reset, written only during power-up/reset
#[derive(Debug, Clone)]
struct AtrCache {
    buffer: [u8; MAX_ATR_SIZE],
    length: usize,
}

impl Default for AtrCache {
    fn default() -> Self {
        Self {
            buffer: [0u8; MAX_ATR_SIZE],
            length: 0,
        }
    }
}

impl AtrCache {
    fn store(&mut self, atr: &[u8]) -> Result<()> {
        if atr.len() > MAX_ATR_SIZE {
            return Err(Error::Communication("ATR exceeds maximum size"));
        }
        self.buffer[..atr.len()].copy_from_slice(atr);
        self.length = atr.len();
        Ok(())
    }

    fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer[..self.length])
    }
}

/// Run the vendor power-up/reset sequence and populate the ATR cache.
///
/// Fetches the declared ATR length, bulk-reads the ATR and verifies the
/// transferred count, exchanges the fixed handshake command, then
/// issues the finalize control transfer. The finalize outcome is
/// logged but does not fail an otherwise successful power-up.
fn power_up_sequence<B: UsbBus>(
    transport: &mut UsbMessageTransport<B>,
    cache: &mut AtrCache,
) -> Result<Bytes> {
    let timeout = transport.config().timeout;
    let verify_echo = transport.config().verify_handshake_echo;

    let mut header = [0u8; CHUNK_SIZE];
    let received = transport.bus().control_in(
        request::FETCH_ATR,
        PARAM_UNUSED,
        PARAM_UNUSED,
        &mut header,
        timeout,
    )?;
    if received == 0 {
        return Err(Error::Communication("empty ATR fetch response"));
    }
    let declared = header[0] as usize;

    let mut scratch = [0u8; CHUNK_SIZE];
    let transferred = transport.bus().bulk_in(&mut scratch, timeout)?;
    if transferred != declared {
        error!(declared, transferred, "ATR read invalid");
        return Err(Error::AtrLengthMismatch {
            declared,
            actual: transferred,
        });
    }
    cache.store(&scratch[..transferred])?;

    transport.write_message(&HANDSHAKE_COMMAND)?;
    let echo = transport.read_message(HANDSHAKE_COMMAND.len())?;
    if verify_echo && echo[..] != HANDSHAKE_COMMAND[..] {
        error!(echo = %hex::encode(&echo), "handshake echo mismatch");
        return Err(Error::HandshakeMismatch);
    }

    if let Err(err) = transport.bus().control_out(
        request::FINALIZE_POWER,
        PARAM_UNUSED,
        PARAM_UNUSED,
        &FINALIZE_PAYLOAD,
        timeout,
    ) {
        // Observed readers complete power-up regardless of this
        // transfer's outcome.
        warn!(error = %err, "finalize-power-up control transfer failed");
    }

    Ok(cache.bytes())
}

/// Transmit into a caller-provided buffer, preserving the host ABI
/// contract: the returned length is the filled prefix, and on any
/// failure nothing is reported as received.
fn transmit_into<C: MessageChannel>(
    channel: &mut C,
    command: &[u8],
    response: &mut [u8],
) -> Result<usize> {
    let bytes = framer::transmit(channel, command)?;
    if bytes.len() > response.len() {
        return Err(Error::Communication("response exceeds receive buffer"));
    }
    response[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

/// An open channel to the reader
///
/// Created by [`UsbReader::open`]; dropped or explicitly closed, it
/// cancels the monitor, releases the interface and tears down the USB
/// context. Opening a second channel while one is alive is not
/// supported.
pub struct UsbReader {
    _context: Context,
    handle: Arc<DeviceHandle<Context>>,
    transport: UsbMessageTransport<RusbBus>,
    atr: AtrCache,
    presence: SharedPresence,
    events: PresenceReceiver,
    cancel: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl fmt::Debug for UsbReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbReader")
            .field("atr_len", &self.atr.length)
            .field("presence", &self.presence.get())
            .field("monitor_running", &self.monitor.is_some())
            .finish()
    }
}

impl UsbReader {
    /// Open the reader with the default configuration
    pub fn open() -> Result<Self> {
        Self::open_with_config(TransportConfig::default())
    }

    /// Open the reader: initialize the USB context, open the device by
    /// its fixed vendor/product identifiers, claim the interface and
    /// start the presence monitor.
    pub fn open_with_config(config: TransportConfig) -> Result<Self> {
        debug!("opening reader channel");

        let context = Context::new().map_err(|err| {
            error!(error = %err, "usb context initialization failed");
            Error::Communication("usb context initialization failed")
        })?;

        let handle = context
            .open_device_with_vid_pid(VENDOR_ID, PRODUCT_ID)
            .ok_or(Error::Communication("reader not found on the bus"))?;

        handle.claim_interface(INTERFACE).map_err(|err| {
            error!(error = %err, "failed to claim interface");
            Error::Communication("failed to claim interface")
        })?;

        let handle = Arc::new(handle);
        let presence = SharedPresence::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, events) = presence_channel();

        let monitor = PresenceMonitor::new(
            RusbBus::new(Arc::clone(&handle)),
            presence.clone(),
            Arc::clone(&cancel),
            sender,
            config.presence_poll_interval,
        );
        let monitor = thread::Builder::new()
            .name("ifdlink-presence".into())
            .spawn(move || monitor.run())
            .map_err(|err| {
                error!(error = %err, "failed to start presence monitor");
                Error::Communication("failed to start presence monitor")
            })?;

        Ok(Self {
            _context: context,
            handle: Arc::clone(&handle),
            transport: UsbMessageTransport::new(RusbBus::new(handle), config),
            atr: AtrCache::default(),
            presence,
            events,
            cancel,
            monitor: Some(monitor),
        })
    }

    /// Close the channel.
    ///
    /// Teardown is best-effort and always succeeds: the monitor is
    /// cancelled and joined, the interface released, the device handle
    /// and context dropped.
    pub fn close(self) {
        // Drop performs the teardown steps in order.
    }

    /// Execute a power request.
    ///
    /// `PowerUp` and `Reset` run the vendor handshake and return the
    /// fresh ATR; `PowerDown` is not supported by this reader.
    pub fn power(&mut self, action: PowerAction) -> Result<Bytes> {
        debug!(?action, "power request");
        match action {
            PowerAction::PowerUp | PowerAction::Reset => {
                power_up_sequence(&mut self.transport, &mut self.atr)
            }
            PowerAction::PowerDown => Err(Error::NotSupported),
        }
    }

    /// Perform one APDU exchange and return the card's response
    pub fn transmit(&mut self, command: &[u8]) -> Result<Bytes> {
        framer::transmit(&mut self.transport, command)
    }

    /// Perform one APDU exchange into a caller-provided buffer,
    /// returning the response length. On failure no bytes are
    /// reported as received.
    pub fn transmit_into(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize> {
        transmit_into(&mut self.transport, command, response)
    }

    /// Answer a capability query
    pub fn capability(&self, capability: Capability) -> Bytes {
        match capability {
            Capability::Atr => self.atr.bytes(),
            Capability::SlotCount => Bytes::from_static(&[1]),
            Capability::SimultaneousAccess => Bytes::from_static(&[0]),
        }
    }

    /// Answer a capability query by host tag number
    pub fn capability_by_tag(&self, tag: u32) -> Result<Bytes> {
        let capability = Capability::from_tag(tag)?;
        Ok(self.capability(capability))
    }

    /// Cached ATR; empty before the first successful power-up
    pub fn atr(&self) -> Bytes {
        self.atr.bytes()
    }

    /// Card presence as last observed by the monitor
    pub fn presence(&self) -> CardPresence {
        self.presence.get()
    }

    /// Stream of presence-change events
    pub const fn presence_events(&self) -> &PresenceReceiver {
        &self.events
    }

    /// Record protocol parameters.
    ///
    /// The reader negotiates nothing; the request is acknowledged and
    /// logged.
    pub fn set_protocol_parameters(
        &mut self,
        protocol: u32,
        flags: u8,
        pts1: u8,
        pts2: u8,
        pts3: u8,
    ) -> Result<()> {
        debug!(protocol, flags, pts1, pts2, pts3, "protocol parameters acknowledged");
        Ok(())
    }

    /// Reader control channel (PIN pads, displays); not present on
    /// this device.
    pub fn control(&mut self, _command: &[u8]) -> Result<Bytes> {
        Err(Error::NotSupported)
    }
}

impl Drop for UsbReader {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
        let _ = self.handle.release_interface(INTERFACE);
        debug!("reader channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::MockBus;

    fn transport(bus: MockBus) -> UsbMessageTransport<MockBus> {
        UsbMessageTransport::new(bus, TransportConfig::default())
    }

    fn script_power_up(bus: &MockBus, atr: &[u8], echo: &[u8]) {
        // ATR fetch header: first byte declares the length
        bus.push_control_in(Ok(vec![atr.len() as u8]));
        // ATR bulk read
        bus.push_bulk_in(Ok(atr.to_vec()));
        // Handshake echo (read after the announce control + bulk write)
        bus.push_bulk_in(Ok(echo.to_vec()));
    }

    #[test]
    fn power_up_caches_and_returns_the_atr() {
        let atr = [0x3B, 0x9F, 0x95, 0x80];
        let bus = MockBus::default();
        script_power_up(&bus, &atr, &HANDSHAKE_COMMAND);
        let mut transport = transport(bus);
        let mut cache = AtrCache::default();

        let returned = power_up_sequence(&mut transport, &mut cache).unwrap();

        assert_eq!(&returned[..], &atr);
        assert_eq!(&cache.bytes()[..], &atr);

        // Handshake went out verbatim, then the finalize payload
        let chunks = transport.bus().bulk_out_chunks.lock().unwrap();
        assert_eq!(chunks[0], HANDSHAKE_COMMAND.to_vec());
        let controls = transport.bus().control_out_calls.lock().unwrap();
        let finalize = controls.last().unwrap();
        assert_eq!(finalize.request, request::FINALIZE_POWER);
        assert_eq!(finalize.data, FINALIZE_PAYLOAD.to_vec());
    }

    #[test]
    fn handshake_echo_mismatch_fails_power_up() {
        let bus = MockBus::default();
        script_power_up(&bus, &[0x3B, 0x60], &[0xFF, 0x10, 0x13, 0x00]);
        let mut transport = transport(bus);
        let mut cache = AtrCache::default();

        assert_eq!(
            power_up_sequence(&mut transport, &mut cache),
            Err(Error::HandshakeMismatch)
        );
        // The finalize transfer never went out
        let controls = transport.bus().control_out_calls.lock().unwrap();
        assert!(controls
            .iter()
            .all(|call| call.request != request::FINALIZE_POWER));
    }

    #[test]
    fn echo_verification_can_be_disabled() {
        let bus = MockBus::default();
        script_power_up(&bus, &[0x3B, 0x60], &[0x00, 0x00, 0x00, 0x00]);
        let config = TransportConfig::default().with_verify_handshake_echo(false);
        let mut transport = UsbMessageTransport::new(bus, config);
        let mut cache = AtrCache::default();

        assert!(power_up_sequence(&mut transport, &mut cache).is_ok());
    }

    #[test]
    fn declared_length_mismatch_fails_power_up() {
        let bus = MockBus::default();
        bus.push_control_in(Ok(vec![6]));
        bus.push_bulk_in(Ok(vec![0x3B, 0x60, 0x00, 0x00]));
        let mut transport = transport(bus);
        let mut cache = AtrCache::default();

        assert_eq!(
            power_up_sequence(&mut transport, &mut cache),
            Err(Error::AtrLengthMismatch {
                declared: 6,
                actual: 4
            })
        );
    }

    #[test]
    fn finalize_failure_does_not_fail_power_up() {
        let atr = [0x3B, 0x60];
        let bus = MockBus::default();
        script_power_up(&bus, &atr, &HANDSHAKE_COMMAND);
        // Announce-write, announce-read succeed; finalize stalls
        bus.control_out_script
            .lock()
            .unwrap()
            .extend([Ok(0), Ok(0), Err(Error::Communication("stall"))]);
        let mut transport = transport(bus);
        let mut cache = AtrCache::default();

        let returned = power_up_sequence(&mut transport, &mut cache).unwrap();
        assert_eq!(&returned[..], &atr);
    }

    #[test]
    fn atr_cache_rejects_oversize_answers() {
        let mut cache = AtrCache::default();
        assert!(cache.store(&[0u8; MAX_ATR_SIZE]).is_ok());
        assert!(cache.store(&[0u8; MAX_ATR_SIZE + 1]).is_err());
    }

    #[test]
    fn atr_cache_is_empty_until_stored() {
        let cache = AtrCache::default();
        assert!(cache.bytes().is_empty());
    }

    #[test]
    fn capability_tags_resolve() {
        assert_eq!(Capability::from_tag(tag::ATR), Ok(Capability::Atr));
        assert_eq!(
            Capability::from_tag(tag::SLOTS_NUMBER),
            Ok(Capability::SlotCount)
        );
        assert_eq!(
            Capability::from_tag(tag::SIMULTANEOUS_ACCESS),
            Ok(Capability::SimultaneousAccess)
        );
        assert_eq!(Capability::from_tag(0x0BAD), Err(Error::UnknownTag(0x0BAD)));
    }

    #[test]
    fn transmit_into_fills_the_callers_buffer() {
        let bus = MockBus::default();
        bus.push_bulk_in(Ok(vec![0x90]));
        bus.push_bulk_in(Ok(vec![0x00]));
        let mut transport = transport(bus);

        let mut response = [0u8; 64];
        let len = transmit_into(&mut transport, &[0x00, 0xA4, 0x00, 0x00], &mut response).unwrap();

        assert_eq!(len, 2);
        assert_eq!(&response[..2], &[0x90, 0x00]);
    }

    #[test]
    fn transmit_into_reports_nothing_on_failure() {
        let bus = MockBus::default();
        bus.push_bulk_in(Err(Error::ResponseTimeout));
        let mut transport = transport(bus);

        let mut response = [0u8; 64];
        let result = transmit_into(&mut transport, &[0x00, 0xA4, 0x00, 0x00], &mut response);

        assert_eq!(result, Err(Error::ResponseTimeout));
    }

    #[test]
    fn transmit_into_rejects_undersized_buffers() {
        let bus = MockBus::default();
        bus.push_bulk_in(Ok(vec![0x90]));
        bus.push_bulk_in(Ok(vec![0x00]));
        let mut transport = transport(bus);

        let mut response = [0u8; 1];
        assert_eq!(
            transmit_into(&mut transport, &[0x00, 0xA4, 0x00, 0x00], &mut response),
            Err(Error::Communication("response exceeds receive buffer"))
        );
    }
}

//! Raw USB primitives behind a mockable seam
//!
//! The transport, monitor and power sequence only ever touch the bus
//! through [`UsbBus`]; the fixed endpoints live in the implementation,
//! not at the call sites.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, Recipient, RequestType};

use ifdlink_apdu_core::Result;

use crate::consts::{BULK_IN_ENDPOINT, BULK_OUT_ENDPOINT, INTERRUPT_IN_ENDPOINT};
use crate::error::map_usb_error;

/// Trait over the reader's five raw transfer primitives
pub trait UsbBus: fmt::Debug + Send + Sync {
    /// Vendor control transfer, host to device
    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Vendor control transfer, device to host
    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Bulk transfer to the fixed OUT endpoint; returns bytes sent
    fn bulk_out(&self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Bulk transfer from the fixed IN endpoint; returns bytes received
    fn bulk_in(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Interrupt transfer from the presence endpoint; returns bytes
    /// received
    fn interrupt_in(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// [`UsbBus`] implementation over a claimed `rusb` device handle
///
/// The handle is shared with the presence monitor thread; libusb
/// serializes transfers on distinct endpoints internally.
#[derive(Clone)]
pub struct RusbBus {
    handle: Arc<DeviceHandle<Context>>,
}

impl fmt::Debug for RusbBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbBus").finish_non_exhaustive()
    }
}

impl RusbBus {
    /// Wrap a claimed device handle
    pub(crate) const fn new(handle: Arc<DeviceHandle<Context>>) -> Self {
        Self { handle }
    }
}

impl UsbBus for RusbBus {
    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle
            .write_control(request_type, request, value, index, data, timeout)
            .map_err(map_usb_error)
    }

    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let request_type =
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
            .map_err(map_usb_error)
    }

    fn bulk_out(&self, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle
            .write_bulk(BULK_OUT_ENDPOINT, data, timeout)
            .map_err(map_usb_error)
    }

    fn bulk_in(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle
            .read_bulk(BULK_IN_ENDPOINT, buf, timeout)
            .map_err(map_usb_error)
    }

    fn interrupt_in(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle
            .read_interrupt(INTERRUPT_IN_ENDPOINT, buf, timeout)
            .map_err(map_usb_error)
    }
}

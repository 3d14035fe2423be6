//! Mapping from USB transfer outcomes to driver result codes
//!
//! Applied uniformly at every point a control, bulk or interrupt
//! transfer is issued; nothing above this layer sees a `rusb` error.

use ifdlink_apdu_core::Error;

/// Translate a `rusb` transfer failure into the driver vocabulary.
///
/// Timeouts and device removal keep their identity; stalls, overflows
/// and everything else fold into the generic communication class.
pub(crate) fn map_usb_error(err: rusb::Error) -> Error {
    match err {
        rusb::Error::Timeout => Error::ResponseTimeout,
        rusb::Error::NoDevice => Error::NoSuchDevice,
        _ => Error::Communication("usb transfer failed"),
    }
}

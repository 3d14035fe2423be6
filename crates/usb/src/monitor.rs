//! Card-presence monitoring
//!
//! A background loop polls the interrupt endpoint and maintains the
//! shared presence state. The monitor is the sole writer; readers are
//! eventually consistent and may lag by at most one poll interval.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error};

use ifdlink_apdu_core::Error;

use crate::bus::UsbBus;

/// Card presence as last observed by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CardPresence {
    /// No card in the reader
    NotPresent = 0,
    /// A card is inserted
    Present = 1,
    /// The last presence poll failed
    CommunicationError = 2,
}

/// Shared presence cell; written only by the monitor thread
#[derive(Debug, Clone)]
pub struct SharedPresence(Arc<AtomicU8>);

impl SharedPresence {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(CardPresence::NotPresent as u8)))
    }

    /// Last state written by the monitor; frozen once the monitor exits
    pub fn get(&self) -> CardPresence {
        match self.0.load(Ordering::Relaxed) {
            1 => CardPresence::Present,
            2 => CardPresence::CommunicationError,
            _ => CardPresence::NotPresent,
        }
    }

    fn set(&self, presence: CardPresence) {
        self.0.store(presence as u8, Ordering::Relaxed);
    }
}

/// Sender half of the presence-event stream
pub(crate) type PresenceSender = Sender<CardPresence>;
/// Receiver half of the presence-event stream
pub type PresenceReceiver = Receiver<CardPresence>;

/// Create an unbounded channel for presence-change events
pub(crate) fn presence_channel() -> (PresenceSender, PresenceReceiver) {
    unbounded()
}

/// The presence-poll loop state
#[derive(Debug)]
pub(crate) struct PresenceMonitor<B> {
    bus: B,
    presence: SharedPresence,
    cancel: Arc<AtomicBool>,
    events: PresenceSender,
    poll_interval: Duration,
}

impl<B: UsbBus> PresenceMonitor<B> {
    pub(crate) const fn new(
        bus: B,
        presence: SharedPresence,
        cancel: Arc<AtomicBool>,
        events: PresenceSender,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bus,
            presence,
            cancel,
            events,
            poll_interval,
        }
    }

    /// Poll until cancelled or the device disappears.
    ///
    /// The interrupt read uses the poll interval as its timeout; a
    /// timeout is not a failure, it is the cancellation checkpoint.
    /// Transient errors are logged and polling continues; device
    /// removal ends the loop for good, leaving the presence cell at
    /// its last written value.
    pub(crate) fn run(self) {
        let mut buffer = [0u8; 1];
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("presence monitor cancelled");
                return;
            }

            match self.bus.interrupt_in(&mut buffer, self.poll_interval) {
                Ok(received) => {
                    let state = if received == 1 && buffer[0] == 0x01 {
                        CardPresence::Present
                    } else {
                        CardPresence::NotPresent
                    };
                    self.update(state);
                }
                Err(Error::ResponseTimeout) => {
                    // No notification within the poll interval.
                }
                Err(Error::NoSuchDevice) => {
                    error!("device removed, presence monitor exiting");
                    return;
                }
                Err(err) => {
                    error!(error = %err, "error while querying card presence");
                    self.update(CardPresence::CommunicationError);
                }
            }
        }
    }

    fn update(&self, state: CardPresence) {
        if self.presence.get() != state {
            debug!(?state, "card presence changed");
            // Nobody may be listening; that is fine.
            let _ = self.events.send(state);
        }
        self.presence.set(state);
    }
}

//! Per-connection capture state.

use std::fs::File;
use std::sync::{Mutex, MutexGuard};

use crate::data_capture::trigger::{CapturePhase, Trigger};
use crate::network::transport::{ConnectionId, Receive};

/// Lifecycle of a connection's capture file. `Closed` is terminal.
#[derive(Debug, Default)]
pub enum LogSlot {
    #[default]
    Unopened,
    Open(File),
    Closed,
}

impl LogSlot {
    pub fn is_open(&self) -> bool {
        matches!(self, LogSlot::Open(_))
    }
}

/// Mutable capture bookkeeping of one connection, only touched from that
/// connection's own hooks.
#[derive(Debug, Default)]
pub struct ConnectionCapture {
    pub trigger: Trigger,
    pub log: LogSlot,
}

/// Capture state attached to one live connection.
///
/// Holds the host's original read function, captured once when the read
/// wrapper was installed and only handed back at teardown.
pub struct ConnectionCaptureState<S> {
    id: ConnectionId,
    capture: Mutex<ConnectionCapture>,
    original_read: Mutex<Option<Box<dyn Receive<S>>>>,
}

impl<S> ConnectionCaptureState<S> {
    pub fn new(id: ConnectionId, original_read: Option<Box<dyn Receive<S>>>) -> Self {
        Self {
            id,
            capture: Mutex::new(ConnectionCapture::default()),
            original_read: Mutex::new(original_read),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, ConnectionCapture> {
        // a panic elsewhere must not take the host connection down with it
        self.capture.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enabled(&self) -> bool {
        self.lock().trigger.enabled()
    }

    pub fn triggered(&self) -> bool {
        self.lock().trigger.triggered()
    }

    pub fn phase(&self) -> CapturePhase {
        self.lock().trigger.phase()
    }

    pub fn file_open(&self) -> bool {
        self.lock().log.is_open()
    }

    /// Calls the host's original read. A session that had no read function
    /// reads nothing.
    pub fn read_original(&self, session: &mut S) -> isize {
        let mut original = self
            .original_read
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match original.as_mut() {
            Some(read) => read.receive(session),
            None => 0,
        }
    }

    /// Hands the original read function back for reinstallation.
    pub(crate) fn take_original(&self) -> Option<Box<dyn Receive<S>>> {
        self.original_read
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

//! Traffic interception for both directions.
//!
//! Inbound: [`CaptureReceive`] replaces a session's read function. It always
//! runs the host's original read first and returns its result untouched;
//! capture happens on the side.
//!
//! Outbound: [`CaptureLayer::before_write`] runs right before the host commits
//! staged bytes and records them without copying them out of, or altering, the
//! host's buffer.
//!
//! [`CaptureLayer`] also carries the connection lifecycle reactions
//! (attach on connect, close on teardown) and owns the side-table.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::recorder::PacketRecorder;
use super::trigger::{discriminator, Inbound};
use super::types::{CaptureStats, Direction};
use crate::configuration::Config;
use crate::error_handling::types::CaptureError;
use crate::network::transport::{ConnectionId, HostSession, Receive};
use crate::session_management::{ConnectionCaptureState, ExtensionStore};

type SharedState<S> = Arc<ConnectionCaptureState<S>>;

/// Read wrapper installed in place of a session's original read function.
pub struct CaptureReceive<S> {
    state: SharedState<S>,
    recorder: Arc<PacketRecorder>,
}

impl<S: HostSession> Receive<S> for CaptureReceive<S> {
    fn receive(&mut self, session: &mut S) -> isize {
        let len = self.state.read_original(session);
        if len <= 0 || !session.is_validated() {
            return len;
        }

        let id = self.state.id();
        let mut capture = self.state.lock();
        if !capture.trigger.enabled() {
            return len;
        }

        let received = session.received();
        let Some(fresh) = received.len().checked_sub(len as usize).map(|start| &received[start..])
        else {
            warn!(
                "[{}] read reported {} bytes but the receive buffer holds {}, not captured",
                id,
                len,
                received.len()
            );
            return len;
        };

        let opt_out = self.recorder.config().role.opt_out_code();
        match capture.trigger.observe_inbound(discriminator(fresh), opt_out) {
            Inbound::Capture => {
                if let Err(e) = self.recorder.record(id, &mut capture, fresh, Direction::Receive) {
                    debug!("[{}] inbound record skipped: {}", id, e);
                }
            }
            Inbound::OptedOut => {
                info!("Disable logging for connection {} (opt-out packet)", id);
                self.recorder.count(|s| s.opted_out += 1);
            }
            Inbound::Ignore => {}
        }
        len
    }
}

/// The capture layer: side-table of per-connection state plus the recorder.
pub struct CaptureLayer<S> {
    store: ExtensionStore<SharedState<S>>,
    recorder: Arc<PacketRecorder>,
}

impl<S: HostSession> CaptureLayer<S> {
    pub fn new(config: Config) -> Self {
        Self {
            store: ExtensionStore::new(),
            recorder: Arc::new(PacketRecorder::new(config)),
        }
    }

    pub fn config(&self) -> &Config {
        self.recorder.config()
    }

    pub fn stats(&self) -> CaptureStats {
        self.recorder.stats()
    }

    pub fn state(&self, id: ConnectionId) -> Option<&ConnectionCaptureState<S>> {
        self.store.lookup(id).map(Arc::as_ref)
    }

    pub fn attached(&self) -> usize {
        self.store.len()
    }

    /// Reaction to a freshly accepted connection: capture the original read,
    /// install the wrapper and attach the state. An already instrumented
    /// connection is left exactly as it was.
    pub fn after_connect(&mut self, id: ConnectionId, session: &mut S) {
        if self.store.contains(id) {
            error!("Double logging for connection {}", id);
            self.recorder.count(|s| s.conflicts += 1);
            return;
        }

        info!("Enable logging for connection {}", id);
        let state = Arc::new(ConnectionCaptureState::new(id, session.take_receiver()));
        session.set_receiver(Box::new(CaptureReceive {
            state: Arc::clone(&state),
            recorder: Arc::clone(&self.recorder),
        }));
        if self.store.attach(id, state).is_ok() {
            self.recorder.count(|s| s.attached += 1);
        }
    }

    /// Outbound hook, called before the host commits `len` staged bytes.
    pub fn before_write(&self, id: ConnectionId, session: &S, len: usize) {
        if len == 0 {
            return;
        }
        let Some(state) = self.store.lookup(id) else {
            return;
        };
        let mut capture = state.lock();
        if !capture.trigger.enabled() || !session.is_validated() {
            return;
        }

        let Some(outbound) = session.staged().get(..len) else {
            warn!(
                "[{}] write of {} bytes exceeds the {} staged bytes, not captured",
                id,
                len,
                session.staged().len()
            );
            return;
        };
        if let Err(e) = self.recorder.record(id, &mut capture, outbound, Direction::Send) {
            debug!("[{}] outbound record skipped: {}", id, e);
        }
    }

    /// Reaction to connection teardown: close the file and release the state.
    /// Returns whether a file was closed; repeated calls are no-ops.
    pub fn before_close(&mut self, id: ConnectionId) -> bool {
        let Some(state) = self.store.detach(id) else {
            return false;
        };
        let mut capture = state.lock();
        let enabled = capture.trigger.enabled();
        let open = capture.log.is_open();
        // mark closed even when nothing was written, so the wrapper never opens late
        let closed = self.recorder.close(id, &mut capture);
        debug!(
            "[{}] capture released (enabled={}, file_open={})",
            id, enabled, open
        );
        closed
    }

    /// Writes the `#account` side-record for an authenticated connection.
    ///
    /// The file must already be open: before the first captured packet this
    /// returns [`CaptureError::NotActive`] and opens nothing.
    pub fn tag_account(&self, id: ConnectionId, account_id: u32) -> Result<(), CaptureError> {
        let state = self.store.lookup(id).ok_or(CaptureError::NotActive)?;
        let mut capture = state.lock();
        if !capture.trigger.enabled() {
            return Err(CaptureError::NotActive);
        }
        self.recorder.tag_account(id, &mut capture, account_id)
    }

    /// Closes every file and hands back each connection's original read
    /// function, so the host can reinstall it.
    pub fn shutdown(&mut self) -> Vec<(ConnectionId, Option<Box<dyn Receive<S>>>)> {
        let recorder = Arc::clone(&self.recorder);
        self.store
            .drain()
            .map(|(id, state)| {
                recorder.close(id, &mut state.lock());
                (id, state.take_original())
            })
            .collect()
    }
}

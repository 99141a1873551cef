//! Capture layer attached to a host transport by composition.
//!
//! `CaptureTransport` holds the host's [`Transport`], implements the same
//! trait, and runs the capture hooks around each delegated call:
//!
//! ```text
//! connect_client ──▶ inner.connect_client ──▶ after_connect (install read wrapper)
//! validate_write ──▶ before_write (record "send") ──▶ inner.validate_write
//! close          ──▶ before_close (close file)    ──▶ inner.close
//! ```
//!
//! Every hook is pass-through: return values of the inner calls reach the
//! caller unchanged, and a connection without capture state behaves exactly as
//! the bare host. Dropping the layer goes through [`CaptureTransport::into_inner`],
//! which reinstalls the original read functions and returns the host as it was.
//!
//! ```
//! use packet_logger::configuration::Config;
//! use packet_logger::network::capture_transport::CaptureTransport;
//! use packet_logger::network::loopback::LoopbackTransport;
//! use packet_logger::network::transport::Transport;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config { log_dir: dir.path().to_path_buf(), ..Config::default() };
//! let mut transport = CaptureTransport::new(LoopbackTransport::new(), config);
//!
//! let id = transport.connect_client(0).unwrap();
//! transport.inner_mut().push_inbound(id, &[0x01, 0x02, 0x03, 0x04]);
//! assert_eq!(transport.receive(id), 4);
//! transport.close(id);
//!
//! assert_eq!(transport.layer().stats().files_closed, 1);
//! let _host = transport.into_inner();
//! ```

use log::debug;

use super::transport::{ConnectionId, HostSession, Transport};
use crate::configuration::Config;
use crate::data_capture::CaptureLayer;

pub struct CaptureTransport<T: Transport> {
    inner: T,
    layer: CaptureLayer<T::Session>,
}

impl<T: Transport> CaptureTransport<T> {
    pub fn new(inner: T, config: Config) -> Self {
        Self {
            inner,
            layer: CaptureLayer::new(config),
        }
    }

    pub fn layer(&self) -> &CaptureLayer<T::Session> {
        &self.layer
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Host-specific operations that the capture layer does not hook.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Runs the session's installed read function, `0` for a dead connection.
    pub fn receive(&mut self, id: ConnectionId) -> isize {
        self.inner
            .session_mut(id)
            .map(HostSession::receive)
            .unwrap_or(0)
    }

    /// Authentication-success hook. Tags the connection's capture file with
    /// the account id and returns `authorized` unchanged.
    pub fn on_auth_ok(&mut self, id: ConnectionId, account_id: u32, authorized: bool) -> bool {
        if !authorized || !self.layer.config().role.tags_accounts() {
            return authorized;
        }
        if self.inner.session(id).is_none() {
            return authorized;
        }
        if let Err(e) = self.layer.tag_account(id, account_id) {
            debug!("[{}] account {} not tagged: {}", id, account_id, e);
        }
        authorized
    }

    /// Tears the capture layer down: closes every capture file, reinstalls
    /// each live connection's original read function and returns the host.
    pub fn into_inner(mut self) -> T {
        for (id, original) in self.layer.shutdown() {
            let Some(session) = self.inner.session_mut(id) else {
                continue;
            };
            match original {
                Some(read) => session.set_receiver(read),
                None => drop(session.take_receiver()),
            }
        }
        self.inner
    }
}

impl<T: Transport> Transport for CaptureTransport<T> {
    type Session = T::Session;

    fn session(&self, id: ConnectionId) -> Option<&Self::Session> {
        self.inner.session(id)
    }

    fn session_mut(&mut self, id: ConnectionId) -> Option<&mut Self::Session> {
        self.inner.session_mut(id)
    }

    fn connect_client(&mut self, listener: ConnectionId) -> Option<ConnectionId> {
        let accepted = self.inner.connect_client(listener);
        if let Some(id) = accepted {
            if let Some(session) = self.inner.session_mut(id) {
                self.layer.after_connect(id, session);
            }
        }
        accepted
    }

    fn validate_write(&mut self, id: ConnectionId, len: usize) {
        if let Some(session) = self.inner.session(id) {
            self.layer.before_write(id, session, len);
        }
        self.inner.validate_write(id, len);
    }

    fn close(&mut self, id: ConnectionId) {
        if self.inner.session(id).is_some() {
            self.layer.before_close(id);
        }
        self.inner.close(id);
    }
}

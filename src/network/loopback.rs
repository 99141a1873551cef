//! In-memory host session layer.
//!
//! `LoopbackTransport` keeps a dense socket table of [`LoopbackSession`]s
//! whose "socket" is a queue of inbound chunks pushed by the caller. It is the
//! reference host for tests and documentation; it follows the same rules as a
//! real socket layer (ids are reused lowest-first, reads append to the receive
//! buffer, `validate_write` commits staged bytes to the send queue).

use std::collections::VecDeque;

use log::debug;

use super::transport::{ConnectionId, HostSession, Receive, Transport};

#[derive(Debug)]
enum Incoming {
    Data(Vec<u8>),
    Error,
}

pub struct LoopbackSession {
    validated: bool,
    incoming: VecDeque<Incoming>,
    received: Vec<u8>,
    staged: Vec<u8>,
    sent: Vec<u8>,
    receiver: Option<Box<dyn Receive<LoopbackSession>>>,
}

/// The host's own read function: moves the next queued chunk into the
/// receive buffer.
fn socket_read(session: &mut LoopbackSession) -> isize {
    match session.incoming.pop_front() {
        Some(Incoming::Data(chunk)) => {
            session.received.extend_from_slice(&chunk);
            chunk.len() as isize
        }
        Some(Incoming::Error) => -1,
        None => 0,
    }
}

impl LoopbackSession {
    fn new() -> Self {
        Self {
            validated: true,
            incoming: VecDeque::new(),
            received: Vec::new(),
            staged: Vec::new(),
            sent: Vec::new(),
            receiver: Some(Box::new(socket_read)),
        }
    }

    /// Bytes committed by `validate_write`, in order.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn stage(&mut self, bytes: &[u8]) {
        self.staged.extend_from_slice(bytes);
    }

    /// Drops `n` processed bytes from the front of the receive buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.received.len());
        self.received.drain(..n);
    }

    pub fn set_validated(&mut self, validated: bool) {
        self.validated = validated;
    }
}

impl HostSession for LoopbackSession {
    fn is_validated(&self) -> bool {
        self.validated
    }

    fn received(&self) -> &[u8] {
        &self.received
    }

    fn staged(&self) -> &[u8] {
        &self.staged
    }

    fn take_receiver(&mut self) -> Option<Box<dyn Receive<Self>>> {
        self.receiver.take()
    }

    fn set_receiver(&mut self, receiver: Box<dyn Receive<Self>>) {
        self.receiver = Some(receiver);
    }
}

#[derive(Default)]
pub struct LoopbackTransport {
    sessions: Vec<Option<LoopbackSession>>,
    closed: Vec<ConnectionId>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes on the connection's socket; the next read delivers them.
    pub fn push_inbound(&mut self, id: ConnectionId, bytes: &[u8]) {
        if let Some(session) = self.session_mut(id) {
            session.incoming.push_back(Incoming::Data(bytes.to_vec()));
        }
    }

    /// Makes the next read on the connection fail.
    pub fn push_error(&mut self, id: ConnectionId) {
        if let Some(session) = self.session_mut(id) {
            session.incoming.push_back(Incoming::Error);
        }
    }

    /// Connections torn down so far, in close order.
    pub fn closed(&self) -> &[ConnectionId] {
        &self.closed
    }
}

impl Transport for LoopbackTransport {
    type Session = LoopbackSession;

    fn session(&self, id: ConnectionId) -> Option<&LoopbackSession> {
        self.sessions.get(id).and_then(Option::as_ref)
    }

    fn session_mut(&mut self, id: ConnectionId) -> Option<&mut LoopbackSession> {
        self.sessions.get_mut(id).and_then(Option::as_mut)
    }

    fn connect_client(&mut self, _listener: ConnectionId) -> Option<ConnectionId> {
        let id = match self.sessions.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.sessions.push(None);
                self.sessions.len() - 1
            }
        };
        self.sessions[id] = Some(LoopbackSession::new());
        debug!("loopback: accepted connection {}", id);
        Some(id)
    }

    fn validate_write(&mut self, id: ConnectionId, len: usize) {
        if let Some(session) = self.session_mut(id) {
            let len = len.min(session.staged.len());
            let committed: Vec<u8> = session.staged.drain(..len).collect();
            session.sent.extend_from_slice(&committed);
        }
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(slot) = self.sessions.get_mut(id) {
            if slot.take().is_some() {
                self.closed.push(id);
                debug!("loopback: closed connection {}", id);
            }
        }
    }
}

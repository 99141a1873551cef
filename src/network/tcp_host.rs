//! Blocking TCP session layer used by the `packet-logger` binary.
//!
//! One listening socket (connection id [`LISTENER`]) and a dense table of
//! accepted sessions. Everything runs on the caller's thread: reads, writes
//! and closes happen inline, which is the execution model the capture layer
//! expects from its host.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use log::{debug, info, warn};

use super::transport::{ConnectionId, HostSession, Receive, Transport};

/// Connection id of the listening socket.
pub const LISTENER: ConnectionId = 0;

const READ_CHUNK: usize = 16 * 1024;

pub struct TcpSession {
    stream: TcpStream,
    peer: SocketAddr,
    received: Vec<u8>,
    staged: Vec<u8>,
    receiver: Option<Box<dyn Receive<TcpSession>>>,
}

fn socket_read(session: &mut TcpSession) -> isize {
    let mut buf = [0u8; READ_CHUNK];
    match session.stream.read(&mut buf) {
        Ok(n) => {
            session.received.extend_from_slice(&buf[..n]);
            n as isize
        }
        Err(e) => {
            debug!("read from {} failed: {}", session.peer, e);
            -1
        }
    }
}

impl TcpSession {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stage(&mut self, bytes: &[u8]) {
        self.staged.extend_from_slice(bytes);
    }

    /// Drops `n` processed bytes from the front of the receive buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.received.len());
        self.received.drain(..n);
    }
}

impl HostSession for TcpSession {
    fn is_validated(&self) -> bool {
        // accepted peers are eligible straight away
        true
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

pub struct TcpHost {
    listener: TcpListener,
    // slot 0 is the listener
    sessions: Vec<Option<TcpSession>>,
}

impl TcpHost {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            sessions: vec![None],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpHost {
    type Session = TcpSession;

    fn session(&self, id: ConnectionId) -> Option<&TcpSession> {
        self.sessions.get(id).and_then(Option::as_ref)
    }

    fn session_mut(&mut self, id: ConnectionId) -> Option<&mut TcpSession> {
        self.sessions.get_mut(id).and_then(Option::as_mut)
    }

    fn connect_client(&mut self, listener: ConnectionId) -> Option<ConnectionId> {
        if listener != LISTENER {
            return None;
        }
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {}", e);
                return None;
            }
        };

        let id = match self.sessions.iter().skip(1).position(Option::is_none) {
            Some(free) => free + 1,
            None => {
                self.sessions.push(None);
                self.sessions.len() - 1
            }
        };
        self.sessions[id] = Some(TcpSession {
            stream,
            peer,
            received: Vec::new(),
            staged: Vec::new(),
            receiver: Some(Box::new(socket_read)),
        });
        info!("Connection {} accepted from {}", id, peer);
        Some(id)
    }

    fn validate_write(&mut self, id: ConnectionId, len: usize) {
        let Some(session) = self.session_mut(id) else {
            return;
        };
        let len = len.min(session.staged.len());
        let committed: Vec<u8> = session.staged.drain(..len).collect();
        if let Err(e) = session.stream.write_all(&committed) {
            warn!("write to {} failed: {}", session.peer, e);
        }
    }

    fn close(&mut self, id: ConnectionId) {
        if id == LISTENER {
            return;
        }
        if let Some(session) = self.sessions.get_mut(id).and_then(Option::take) {
            let _ = session.stream.shutdown(Shutdown::Both);
            info!("Connection {} from {} closed", id, session.peer);
        }
    }
}

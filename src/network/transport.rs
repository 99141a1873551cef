//! Host-facing contract.
//!
//! The capture layer never owns sockets. The host session layer implements
//! [`Transport`] and [`HostSession`]; the capture layer wraps them (see
//! [`CaptureTransport`](super::capture_transport::CaptureTransport)) instead of
//! rebinding process-wide function slots.

/// Host-assigned handle of one live network session (a dense socket index).
pub type ConnectionId = usize;

/// Per-connection inbound read operation.
///
/// The host stores one boxed receiver in every session and calls it whenever
/// the socket is readable. Implementations append freshly read bytes to the
/// session's receive buffer.
pub trait Receive<S>: Send {
    /// Returns the number of bytes appended to the receive buffer, or `<= 0`
    /// on error / no data.
    fn receive(&mut self, session: &mut S) -> isize;
}

impl<S, F> Receive<S> for F
where
    F: FnMut(&mut S) -> isize + Send,
{
    fn receive(&mut self, session: &mut S) -> isize {
        self(session)
    }
}

/// Host-owned state of one live session, as seen by the capture layer.
pub trait HostSession: Sized + 'static {
    /// Host-defined sanity flag; only validated sessions are eligible for capture.
    fn is_validated(&self) -> bool;

    /// Receive buffer contents. Bytes appended by the last read are at the end.
    fn received(&self) -> &[u8];

    /// Outbound bytes staged at the write head, about to be committed by
    /// [`Transport::validate_write`].
    fn staged(&self) -> &[u8];

    /// Removes the session's read function, leaving the slot empty.
    fn take_receiver(&mut self) -> Option<Box<dyn Receive<Self>>>;

    fn set_receiver(&mut self, receiver: Box<dyn Receive<Self>>);

    /// Runs the session's current read function.
    fn receive(&mut self) -> isize {
        match self.take_receiver() {
            Some(mut receiver) => {
                let len = receiver.receive(self);
                self.set_receiver(receiver);
                len
            }
            None => 0,
        }
    }
}

/// The host session layer: socket table plus the operations the capture layer
/// hooks into.
pub trait Transport {
    type Session: HostSession;

    /// Returns the session while the host considers `id` live.
    fn session(&self, id: ConnectionId) -> Option<&Self::Session>;

    fn session_mut(&mut self, id: ConnectionId) -> Option<&mut Self::Session>;

    /// Accepts one pending client on `listener`, returning the new connection.
    fn connect_client(&mut self, listener: ConnectionId) -> Option<ConnectionId>;

    /// Commits `len` staged outbound bytes to the send queue.
    fn validate_write(&mut self, id: ConnectionId, len: usize);

    /// Tears the connection down.
    fn close(&mut self, id: ConnectionId);
}

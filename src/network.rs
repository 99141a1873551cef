//! Host session layer contract, the capture decorator, and two reference hosts.

pub mod capture_transport;
pub mod loopback;
pub mod tcp_host;
pub mod transport;

pub use capture_transport::CaptureTransport;
pub use transport::{ConnectionId, HostSession, Receive, Transport};

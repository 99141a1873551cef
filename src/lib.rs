//! Packet capture shim for an existing session layer.
//!
//! The layer wraps a host [`Transport`](network::Transport): each accepted
//! connection gets its read function wrapped, every validated inbound read and
//! outbound write is appended to a per-connection text file, and closing the
//! connection closes the file. Capture never changes what the host observes.

pub mod configuration;
pub mod data_capture;
pub mod error_handling;
pub mod network;
pub mod session_management;

pub use configuration::{Config, ServerRole};
pub use network::CaptureTransport;

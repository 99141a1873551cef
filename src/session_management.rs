//! Per-connection capture state and the side-table holding it.

pub mod capture_state;
pub mod extension_store;

pub use capture_state::{ConnectionCapture, ConnectionCaptureState, LogSlot};
pub use extension_store::ExtensionStore;

pub mod format;
pub mod interceptor;
#[cfg(test)]
pub mod integration_tests;
pub mod recorder;
pub mod trigger;
pub mod types;

pub use format::{CaptureLog, CaptureRecord, LogEntry};
pub use interceptor::{CaptureLayer, CaptureReceive};
pub use recorder::PacketRecorder;
pub use trigger::{CapturePhase, Trigger};
pub use types::{CaptureStats, Direction};

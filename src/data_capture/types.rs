//! Common data types used across the data_capture subsystem.

use std::fmt;

/// Direction of captured bytes, relative to the host server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes the server is about to send.
    Send,
    /// Bytes the server just received.
    Receive,
}

impl Direction {
    /// Marker line written before every record.
    pub fn code(self) -> u16 {
        match self {
            Direction::Send => 5252,
            Direction::Receive => 5353,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            5252 => Some(Direction::Send),
            5353 => Some(Direction::Receive),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "recv"),
        }
    }
}

/// Running counters of the capture layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Connections that got capture state attached.
    pub attached: u64,
    /// Attach attempts rejected because state already existed.
    pub conflicts: u64,
    /// Connections disabled by the opt-out discriminator.
    pub opted_out: u64,
    pub files_opened: u64,
    pub files_closed: u64,
    pub records_written: u64,
    /// File operations that failed and disabled capture on their connection.
    pub io_failures: u64,
}

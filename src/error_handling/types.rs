use std::fmt;

use crate::network::transport::ConnectionId;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures of the capture layer itself. None of these ever reach the host
/// connection; they are logged and, for I/O, disable capture on that connection.
#[derive(Debug)]
pub enum CaptureError {
    /// Opening, writing or flushing the capture file failed.
    Io(std::io::Error),
    /// No capture file is open for the connection (yet).
    NotActive,
    /// The capture file was already closed and is never reopened.
    Closed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Io(e) => write!(f, "Capture file IO error: {}", e),
            CaptureError::NotActive => write!(f, "Capture not yet active"),
            CaptureError::Closed => write!(f, "Capture file already closed"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    AlreadyAttached(ConnectionId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AlreadyAttached(id) => {
                write!(f, "Capture state already attached to connection {}", id)
            }
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, PartialEq, Eq)]
pub enum FormatError {
    MissingHeader(&'static str),
    BadLine { line: usize, reason: String },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::MissingHeader(h) => write!(f, "Missing header line: {}", h),
            FormatError::BadLine { line, reason } => write!(f, "Line {}: {}", line, reason),
        }
    }
}

impl std::error::Error for FormatError {}

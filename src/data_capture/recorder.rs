//! Capture file writer.
//!
//! `PacketRecorder` turns captured payloads into format-2 records (see
//! [`format`](super::format)) appended to one file per connection. Files are
//! opened lazily on the first record, every record is handed to the OS before
//! the call returns, and a file is closed at most once.
//!
//! I/O failures never reach the host: the connection's capture is disabled,
//! its file dropped, and a warning logged.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Local, Utc};
use log::{debug, trace, warn};

use super::format;
use super::types::{CaptureStats, Direction};
use crate::configuration::Config;
use crate::error_handling::types::CaptureError;
use crate::network::transport::ConnectionId;
use crate::session_management::{ConnectionCapture, LogSlot};

/// Name suffixes tried before giving up on a crowded second.
const MAX_NAME_ATTEMPTS: u32 = 1000;

const PREVIEW_BYTES: usize = 32;

#[derive(Debug)]
pub struct PacketRecorder {
    config: Config,
    stats: Mutex<CaptureStats>,
}

impl PacketRecorder {
    pub fn new(config: Config) -> Self {
        debug!(
            "PacketRecorder created: role={}, dir={}",
            config.role.tag(),
            config.log_dir.display()
        );
        Self {
            config,
            stats: Mutex::new(CaptureStats::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn count(&self, update: impl FnOnce(&mut CaptureStats)) {
        update(&mut self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
    }

    /// Appends one record, opening the connection's file first if needed.
    pub fn record(
        &self,
        id: ConnectionId,
        capture: &mut ConnectionCapture,
        payload: &[u8],
        direction: Direction,
    ) -> Result<(), CaptureError> {
        if !capture.trigger.enabled() {
            return Err(CaptureError::NotActive);
        }
        if let LogSlot::Unopened = capture.log {
            match self.open() {
                Ok((file, path)) => {
                    debug!("[{}] capture file opened: {}", id, path.display());
                    self.count(|s| s.files_opened += 1);
                    capture.log = LogSlot::Open(file);
                }
                Err(e) => return Err(self.fail(id, capture, e)),
            }
        }

        let LogSlot::Open(file) = &mut capture.log else {
            return Err(CaptureError::Closed);
        };
        let line = format::record(&Utc::now(), direction, payload);
        if let Err(e) = self.append(file, &line) {
            return Err(self.fail(id, capture, e));
        }

        self.count(|s| s.records_written += 1);
        trace!(
            "[{}] {} {} bytes: {}{}",
            id,
            direction,
            payload.len(),
            hex::encode(&payload[..payload.len().min(PREVIEW_BYTES)]),
            if payload.len() > PREVIEW_BYTES { " ..." } else { "" }
        );
        Ok(())
    }

    /// Writes `#account <id>` into an already open file. Never opens one.
    pub fn tag_account(
        &self,
        id: ConnectionId,
        capture: &mut ConnectionCapture,
        account_id: u32,
    ) -> Result<(), CaptureError> {
        let file = match &mut capture.log {
            LogSlot::Open(file) => file,
            LogSlot::Unopened => return Err(CaptureError::NotActive),
            LogSlot::Closed => return Err(CaptureError::Closed),
        };
        if let Err(e) = self.append(file, &format::account(account_id)) {
            return Err(self.fail(id, capture, e));
        }
        debug!("[{}] tagged with account {}", id, account_id);
        Ok(())
    }

    /// Flushes and closes the file if one is open and marks the slot closed
    /// for good. Returns whether a file was closed by this call.
    pub fn close(&self, id: ConnectionId, capture: &mut ConnectionCapture) -> bool {
        match std::mem::replace(&mut capture.log, LogSlot::Closed) {
            LogSlot::Open(mut file) => {
                if let Err(e) = file.flush().and_then(|_| file.sync_all()) {
                    warn!("[{}] flushing capture file on close failed: {}", id, e);
                }
                drop(file);
                self.count(|s| s.files_closed += 1);
                debug!("[{}] capture file closed", id);
                true
            }
            LogSlot::Unopened | LogSlot::Closed => false,
        }
    }

    fn open(&self) -> io::Result<(File, PathBuf)> {
        fs::create_dir_all(&self.config.log_dir)?;

        let opened = Local::now();
        let stem = format::file_stem(&self.config, &opened);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.config.log_dir.join(format::file_name(&stem, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    self.append(&mut file, &format::header(&self.config, opened.timestamp()))?;
                    return Ok((file, path));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free capture file name for {}", stem),
        ))
    }

    fn append(&self, file: &mut File, text: &str) -> io::Result<()> {
        file.write_all(text.as_bytes())?;
        file.flush()?;
        if self.config.sync_records {
            file.sync_data()?;
        }
        Ok(())
    }

    fn fail(&self, id: ConnectionId, capture: &mut ConnectionCapture, e: io::Error) -> CaptureError {
        warn!("[{}] capture file error, capture disabled: {}", id, e);
        capture.trigger.disable();
        if capture.log.is_open() {
            capture.log = LogSlot::Closed;
        }
        self.count(|s| s.io_failures += 1);
        CaptureError::Io(e)
    }
}

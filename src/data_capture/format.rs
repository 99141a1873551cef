//! Capture file naming and the line-oriented "format 2" text layout.
//!
//! ```text
//! #format 2
//! #packetversion <N> <packetType>
//! #time <epochSeconds>
//! #time <epochSeconds>.<epochMicroseconds>
//! <5252|5353>
//! <hexBytes>
//! #account <accountId>
//! ```
//!
//! The first three lines are written once when the file is created; every
//! record repeats the `#time`, direction and hex lines.

use chrono::{DateTime, Local, Utc};

use super::types::Direction;
use crate::configuration::Config;
use crate::error_handling::types::FormatError;

pub const FORMAT_VERSION: u32 = 2;

/// `<role>_<packetVersion>_<packetType>_<YYYY-MM-DD_HH-MM-SS>`
pub fn file_stem(config: &Config, opened: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_{}",
        config.role.tag(),
        config.packet_version,
        config.packet_type,
        opened.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// File name for the `attempt`-th try; attempts past the first only happen
/// when another connection already took the name within the same second.
pub fn file_name(stem: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}.txt", stem)
    } else {
        format!("{}_{}.txt", stem, attempt)
    }
}

pub fn header(config: &Config, opened_epoch: i64) -> String {
    format!(
        "#format {}\n#packetversion {} {}\n#time {}\n",
        FORMAT_VERSION, config.packet_version, config.packet_type, opened_epoch
    )
}

pub fn record(at: &DateTime<Utc>, direction: Direction, payload: &[u8]) -> String {
    format!(
        "#time {}.{}\n{}\n{}\n",
        at.timestamp(),
        at.timestamp_subsec_micros(),
        direction.code(),
        hex::encode(payload)
    )
}

pub fn account(account_id: u32) -> String {
    format!("#account {}\n", account_id)
}

/// One captured packet read back from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub seconds: i64,
    pub micros: u32,
    pub direction: Direction,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Record(CaptureRecord),
    Account(u32),
}

/// Parsed contents of a capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLog {
    pub format: u32,
    pub packet_version: u32,
    pub packet_type: String,
    pub opened_at: i64,
    pub entries: Vec<LogEntry>,
}

impl CaptureLog {
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end()))
            .filter(|(_, l)| !l.is_empty());

        let (n, line) = lines.next().ok_or(FormatError::MissingHeader("#format"))?;
        let format = parse_field(n, line, "#format ")?;

        let (n, line) = lines
            .next()
            .ok_or(FormatError::MissingHeader("#packetversion"))?;
        let rest = strip(n, line, "#packetversion ")?;
        let (version, packet_type) = rest
            .split_once(' ')
            .ok_or_else(|| bad(n, "expected '<version> <type>'"))?;
        let packet_version = version
            .parse()
            .map_err(|e| bad(n, &format!("packet version: {}", e)))?;

        let (n, line) = lines.next().ok_or(FormatError::MissingHeader("#time"))?;
        let opened_at = parse_field(n, line, "#time ")?;

        let mut entries = Vec::new();
        while let Some((n, line)) = lines.next() {
            if let Some(id) = line.strip_prefix("#account ") {
                let id = id.parse().map_err(|e| bad(n, &format!("account id: {}", e)))?;
                entries.push(LogEntry::Account(id));
                continue;
            }

            let stamp = strip(n, line, "#time ")?;
            let (seconds, micros) = stamp
                .split_once('.')
                .ok_or_else(|| bad(n, "expected '<seconds>.<micros>'"))?;
            let seconds = seconds
                .parse()
                .map_err(|e| bad(n, &format!("seconds: {}", e)))?;
            let micros = micros
                .parse()
                .map_err(|e| bad(n, &format!("micros: {}", e)))?;

            let (n, line) = lines
                .next()
                .ok_or_else(|| bad(n, "record without direction line"))?;
            let direction = line
                .parse()
                .ok()
                .and_then(Direction::from_code)
                .ok_or_else(|| bad(n, "unknown direction code"))?;

            // an empty payload leaves an empty line, which the filter skipped
            let payload = match lines.clone().next() {
                Some((_, next)) if !next.starts_with('#') => {
                    let (n, hex_line) = lines.next().ok_or_else(|| bad(n, "missing payload"))?;
                    hex::decode(hex_line).map_err(|e| bad(n, &format!("payload: {}", e)))?
                }
                _ => Vec::new(),
            };

            entries.push(LogEntry::Record(CaptureRecord {
                seconds,
                micros,
                direction,
                payload,
            }));
        }

        Ok(Self {
            format,
            packet_version,
            packet_type: packet_type.to_string(),
            opened_at,
            entries,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = &CaptureRecord> {
        self.entries.iter().filter_map(|e| match e {
            LogEntry::Record(r) => Some(r),
            LogEntry::Account(_) => None,
        })
    }

    pub fn accounts(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().filter_map(|e| match e {
            LogEntry::Account(id) => Some(*id),
            LogEntry::Record(_) => None,
        })
    }
}

fn bad(line: usize, reason: &str) -> FormatError {
    FormatError::BadLine {
        line,
        reason: reason.to_string(),
    }
}

fn strip<'a>(n: usize, line: &'a str, prefix: &str) -> Result<&'a str, FormatError> {
    line.strip_prefix(prefix)
        .ok_or_else(|| bad(n, &format!("expected '{}'", prefix.trim_end())))
}

fn parse_field<T>(n: usize, line: &str, prefix: &str) -> Result<T, FormatError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    strip(n, line, prefix)?
        .parse()
        .map_err(|e: T::Err| bad(n, &e.to_string()))
}

//! Per-connection enable/trigger policy.
//!
//! ```text
//!  EnabledUntriggered ──opt-out code──▶ Disabled (absorbing)
//!         │
//!         └──any other first inbound──▶ EnabledTriggered
//! ```
//!
//! `triggered` only ever goes from false to true. `enabled` only ever goes
//! from true to false.

/// Externally visible phase of a connection's capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Disabled,
    EnabledUntriggered,
    EnabledTriggered,
}

/// What to do with a validated inbound read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Record the bytes.
    Capture,
    /// The read carried the opt-out code; capture is now off for good.
    OptedOut,
    /// Capture was already disabled.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    enabled: bool,
    triggered: bool,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger {
    pub fn new() -> Self {
        Self {
            enabled: true,
            triggered: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn phase(&self) -> CapturePhase {
        match (self.enabled, self.triggered) {
            (false, _) => CapturePhase::Disabled,
            (true, false) => CapturePhase::EnabledUntriggered,
            (true, true) => CapturePhase::EnabledTriggered,
        }
    }

    /// Feeds one validated inbound read. `discriminator` is the little-endian
    /// packet id at the start of the fresh bytes, if there are at least two.
    pub fn observe_inbound(&mut self, discriminator: Option<u16>, opt_out: Option<u16>) -> Inbound {
        if !self.enabled {
            return Inbound::Ignore;
        }
        if !self.triggered {
            if let (Some(code), Some(opt_out)) = (discriminator, opt_out) {
                if code == opt_out {
                    self.enabled = false;
                    return Inbound::OptedOut;
                }
            }
            self.triggered = true;
        }
        Inbound::Capture
    }

    /// Turns capture off after the capture file became unusable.
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }
}

/// Reads the 2-byte packet id the host protocol puts at the start of a packet.
pub fn discriminator(fresh: &[u8]) -> Option<u16> {
    match fresh {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

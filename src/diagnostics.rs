use serde::{Deserialize, Serialize};

const LAST_COMMAND_MAX: usize = 31;
const LAST_RESPONSE_MAX: usize = 255;
const STATUS_MAX: usize = 63;
const LOCATION_RESPONSE_MAX: usize = 127;

/// Keep at most the first `max` bytes of `text`, cut on a character boundary
pub(crate) fn bounded(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Read-only record of the driver's most recent protocol activity.
///
/// Text fields are length-bounded for display; longer values keep their
/// leading bytes.
pub struct DiagnosticsSnapshot {
    last_command: String,
    last_response: String,
    status_text: String,
    location_response_text: String,
    last_update_tick: u32,
    fix_attempts: u32,
}

impl Default for DiagnosticsSnapshot {
    fn default() -> Self {
        Self {
            last_command: "None".into(),
            last_response: "None".into(),
            status_text: "Not initialized".into(),
            location_response_text: "None".into(),
            last_update_tick: 0,
            fix_attempts: 0,
        }
    }
}

impl DiagnosticsSnapshot {
    /// Last command written to the modem
    pub fn last_command(&self) -> &str {
        &self.last_command
    }

    /// Raw reply to the last command
    pub fn last_response(&self) -> &str {
        &self.last_response
    }

    /// Human-readable driver status
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Reply to the most recent location query
    pub fn location_response_text(&self) -> &str {
        &self.location_response_text
    }

    /// Clock tick of the most recent location poll
    pub fn last_update_tick(&self) -> u32 {
        self.last_update_tick
    }

    /// Number of location polls issued
    pub fn fix_attempts(&self) -> u32 {
        self.fix_attempts
    }

    pub(crate) fn record_exchange(&mut self, cmd: &str, response: &str) {
        self.last_command = bounded(cmd, LAST_COMMAND_MAX);
        self.last_response = bounded(response, LAST_RESPONSE_MAX);
    }

    pub(crate) fn set_status(&mut self, status: &str) {
        self.status_text = bounded(status, STATUS_MAX);
    }

    pub(crate) fn record_poll(&mut self, response: &str, status: &str, tick: u32) {
        self.location_response_text = bounded(response, LOCATION_RESPONSE_MAX);
        self.set_status(status);
        self.fix_attempts = self.fix_attempts.wrapping_add(1);
        self.last_update_tick = tick;
    }
}

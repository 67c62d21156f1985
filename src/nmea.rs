use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::{diagnostics::bounded, location::FixData};

/// Number of sentences kept in the history
pub const HISTORY_CAPACITY: usize = 10;
/// Longest sentence kept in the history, in bytes
pub const SENTENCE_MAX_LEN: usize = 81;

/// Data field holding the satellite count in a GGA sentence
const SATELLITES_FIELD: usize = 7;
/// Data field holding the altitude in a GGA sentence
const ALTITUDE_FIELD: usize = 9;
/// Partial lines longer than this are discarded
const LINE_BUFFER_MAX: usize = 256;

lazy_static! {
    static ref SENTENCE_HEADER: Regex =
        Regex::new(r"\$(?P<talker>GP|GN)(?P<kind>[A-Z]{3}),").expect("Failed to compile regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Ring buffer of the most recent position sentences
pub struct SentenceHistory {
    slots: Vec<String>,
    write_index: usize,
    count: usize,
}

impl Default for SentenceHistory {
    fn default() -> Self {
        Self {
            slots: vec![String::new(); HISTORY_CAPACITY],
            write_index: 0,
            count: 0,
        }
    }
}

impl SentenceHistory {
    /// Store a sentence, evicting the oldest one when full
    pub fn push(&mut self, sentence: &str) {
        let sentence = sentence.trim_end_matches(['\r', '\n']);
        self.slots[self.write_index] = bounded(sentence, SENTENCE_MAX_LEN);
        self.write_index = (self.write_index + 1) % HISTORY_CAPACITY;
        self.count = (self.count + 1).min(HISTORY_CAPACITY);
    }

    /// Number of stored sentences
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if nothing was stored yet
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot the next sentence will be written to
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Stored sentences, oldest first
    pub fn entries(&self) -> Vec<&str> {
        let start = (self.write_index + HISTORY_CAPACITY - self.count) % HISTORY_CAPACITY;
        (0..self.count)
            .map(|i| self.slots[(start + i) % HISTORY_CAPACITY].as_str())
            .collect()
    }
}

/// Satellite count and altitude of a GGA sentence.
///
/// Walks the sentence one field at a time; the line is rejected unless the
/// altitude field is reached and both numbers parse.
fn extract_gga(sentence: &str) -> Option<(u8, f64)> {
    let mut field = 0;
    let mut start = 0;
    let mut satellites = None;
    let mut altitude = None;
    let bytes = sentence.as_bytes();
    for i in 0..=bytes.len() {
        // end of input closes the last field like a checksum marker
        let b = bytes.get(i).copied().unwrap_or(b'*');
        if b != b',' && b != b'*' && b != b'\r' && b != b'\n' {
            continue;
        }
        let value = sentence[start..i].trim();
        match field {
            SATELLITES_FIELD => satellites = Some(value.parse::<u8>().ok()?),
            ALTITUDE_FIELD => altitude = Some(value.parse::<f64>().ok()?),
            _ => {}
        }
        if b != b',' || field == ALTITUDE_FIELD {
            break;
        }
        field += 1;
        start = i + 1;
    }
    Some((satellites?, altitude?))
}

/// Consumes unsolicited sentences from the modem, byte by byte.
#[derive(Debug, Default)]
pub(crate) struct SentenceProcessor {
    line: Vec<u8>,
    history: SentenceHistory,
}

impl SentenceProcessor {
    pub fn history(&self) -> &SentenceHistory {
        &self.history
    }

    /// Accumulate bytes and handle every completed line
    pub fn feed(&mut self, bytes: &[u8], fix: &mut FixData) {
        for &b in bytes {
            self.line.push(b);
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.handle_line(&line, fix);
            } else if self.line.len() > LINE_BUFFER_MAX {
                log::trace!("Dropping overlong partial line");
                self.line.clear();
            }
        }
    }

    /// Pull sentences that arrived in the middle of a command reply.
    ///
    /// Returns the reply with those lines removed. A sentence cut off by the
    /// previous drain is completed from the head of the reply, and a
    /// trailing partial sentence is kept in the line buffer.
    pub fn split_from_reply(&mut self, reply: &str, fix: &mut FixData) -> String {
        let mut reply = reply;
        if self.line.contains(&b'$') {
            let end = reply.find('\n').map_or(reply.len(), |i| i + 1);
            self.feed(reply[..end].as_bytes(), fix);
            reply = &reply[end..];
        } else {
            self.line.clear();
        }
        let mut rest = String::with_capacity(reply.len());
        for segment in reply.split_inclusive('\n') {
            if !segment.ends_with('\n') && segment.contains('$') {
                self.feed(segment.as_bytes(), fix);
            } else if SENTENCE_HEADER.is_match(segment) {
                self.handle_line(segment, fix);
            } else {
                rest.push_str(segment);
            }
        }
        rest
    }

    fn handle_line(&mut self, line: &str, fix: &mut FixData) {
        let Some(caps) = SENTENCE_HEADER.captures(line) else {
            return;
        };
        self.history.push(line);
        if &caps["kind"] != "GGA" {
            return;
        }
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        match extract_gga(&line[start..]) {
            Some((satellites, altitude)) => {
                fix.satellite_count = satellites;
                fix.altitude = altitude;
            }
            None => log::trace!("Ignoring short or malformed GGA: {}", line.trim_end()),
        }
    }
}

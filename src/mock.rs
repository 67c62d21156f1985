//! In-memory stand-ins for the modem, clock and store.
//!
//! Handles are cheap clones sharing one state, so a test can keep a handle
//! for inspection after moving another into the driver.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    clock::Clock,
    serial::{ControlLines, SerialTransport, TransportError},
    store::{PersistentStore, StoreError},
};

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<String>,
    sticky: Option<String>,
}

#[derive(Debug, Default)]
struct ModemState {
    scripts: HashMap<String, Script>,
    rx: VecDeque<u8>,
    sent: Vec<String>,
    baud: Option<u32>,
    refuse_open: bool,
    power_key: bool,
    power_pulses: usize,
}

/// Scripted modem: replies are queued on the receive side as soon as a
/// matching command is written.
#[derive(Debug, Clone, Default)]
pub struct MockModem {
    state: Rc<RefCell<ModemState>>,
}

impl MockModem {
    /// Create a silent modem
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every `cmd` with `response`, after any one-shot replies are used up
    pub fn respond(&self, cmd: &str, response: &str) {
        self.state
            .borrow_mut()
            .scripts
            .entry(cmd.to_string())
            .or_default()
            .sticky = Some(response.to_string());
    }

    /// Reply to the next `cmd` with `response`, once
    pub fn respond_once(&self, cmd: &str, response: &str) {
        self.state
            .borrow_mut()
            .scripts
            .entry(cmd.to_string())
            .or_default()
            .queued
            .push_back(response.to_string());
    }

    /// Queue unsolicited bytes on the receive side
    pub fn inject(&self, data: &[u8]) {
        self.state.borrow_mut().rx.extend(data.iter().copied());
    }

    /// Make `begin` fail
    pub fn refuse_open(&self) {
        self.state.borrow_mut().refuse_open = true;
    }

    /// Every line written so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.clone()
    }

    /// How many times `cmd` was written
    pub fn count(&self, cmd: &str) -> usize {
        self.state.borrow().sent.iter().filter(|s| *s == cmd).count()
    }

    /// Forget the recorded command history
    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// Baud rate passed to `begin`, if it was called
    pub fn baud(&self) -> Option<u32> {
        self.state.borrow().baud
    }

    /// Number of high-to-low transitions on the power key
    pub fn power_pulses(&self) -> usize {
        self.state.borrow().power_pulses
    }
}

impl SerialTransport for MockModem {
    fn begin(&mut self, baud: u32) -> Result<(), TransportError> {
        let mut st = self.state.borrow_mut();
        if st.refuse_open {
            return Err(TransportError::NotOpen);
        }
        st.baud = Some(baud);
        Ok(())
    }

    fn available(&mut self) -> bool {
        !self.state.borrow().rx.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.state.borrow_mut().rx.pop_front()
    }

    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        let mut st = self.state.borrow_mut();
        st.sent.push(text.to_string());
        let reply = st.scripts.get_mut(text).and_then(|script| {
            script
                .queued
                .pop_front()
                .or_else(|| script.sticky.clone())
        });
        if let Some(reply) = reply {
            st.rx.extend(reply.bytes());
        }
        Ok(())
    }
}

impl ControlLines for MockModem {
    fn set_power_key(&mut self, high: bool) {
        let mut st = self.state.borrow_mut();
        if st.power_key && !high {
            st.power_pulses += 1;
        }
        st.power_key = high;
    }

    fn set_reset(&mut self, _high: bool) {}

    fn set_low_power(&mut self, _high: bool) {}
}

/// Manually driven clock; only `delay_ms` and `advance` move it.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Rc<Cell<u32>>,
    epoch: DateTime<Utc>,
}

impl MockClock {
    /// Clock at tick 0, wall time 2024-01-25 12:30:45 UTC
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            epoch: Utc
                .with_ymd_and_hms(2024, 1, 25, 12, 30, 45)
                .single()
                .unwrap_or_default(),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }

    fn wall_time(&self) -> DateTime<Utc> {
        self.epoch + Duration::milliseconds(self.now.get() as i64)
    }
}

/// Line store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Rc<RefCell<HashMap<String, Vec<String>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines of `name`, empty if it does not exist
    pub fn lines(&self, name: &str) -> Vec<String> {
        self.files.borrow().get(name).cloned().unwrap_or_default()
    }
}

impl PersistentStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.files.borrow().contains_key(name)
    }

    fn read_line(&mut self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .files
            .borrow()
            .get(name)
            .and_then(|lines| lines.first().cloned()))
    }

    fn write_line(&mut self, name: &str, line: &str) -> Result<(), StoreError> {
        self.files
            .borrow_mut()
            .insert(name.to_string(), vec![line.to_string()]);
        Ok(())
    }

    fn append_line(&mut self, name: &str, line: &str) -> Result<(), StoreError> {
        self.files
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
        Ok(())
    }
}

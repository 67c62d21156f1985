use crate::{
    channel::CommandChannel,
    clock::{elapsed_ms, Clock},
    config::GpsConfig,
    diagnostics::DiagnosticsSnapshot,
    lifecycle::ModuleState,
    location::{classify, parse_location, FixData, FixOutcome},
    nmea::{SentenceHistory, SentenceProcessor},
    serial::{ControlLines, SerialTransport},
    store::{load_place_name, PersistentStore},
};

const CMD_LOCATION: &str = "AT+LOCATION=2";
const LOCATION_TIMEOUT_MS: u32 = 2000;

/// Placeholder for [`A9gGps::location_string`] and place-name lookups without a fix
pub const NO_FIX_TEXT: &str = "No GPS Fix";

/// Driver for an A9G cellular/GPS module on a serial link.
///
/// Single-threaded: every operation runs to completion on the caller's
/// thread, and command exchanges block for up to their timeout window.
pub struct A9gGps<T, C, S> {
    pub(crate) channel: CommandChannel<T, C>,
    pub(crate) store: S,
    pub(crate) config: GpsConfig,
    pub(crate) state: ModuleState,
    pub(crate) fix: FixData,
    pub(crate) diagnostics: DiagnosticsSnapshot,
    sentences: SentenceProcessor,
    last_poll: u32,
}

impl<T, C, S> A9gGps<T, C, S>
where
    T: SerialTransport + ControlLines,
    C: Clock,
    S: PersistentStore,
{
    /// Create a driver; nothing is sent until [`A9gGps::begin`]
    pub fn new(transport: T, clock: C, store: S, config: GpsConfig) -> Self {
        Self {
            channel: CommandChannel::new(transport, clock),
            store,
            config,
            state: ModuleState::Off,
            fix: FixData::default(),
            diagnostics: DiagnosticsSnapshot::default(),
            sentences: SentenceProcessor::default(),
            last_poll: 0,
        }
    }

    /// Run one main-loop tick.
    ///
    /// Polls the location if the poll interval has passed, then drains any
    /// passive sentences. Returns the classification of the poll, if one was
    /// made. Does nothing unless the module is [`ModuleState::Ready`].
    pub fn update(&mut self) -> Option<FixOutcome> {
        if self.state != ModuleState::Ready {
            return None;
        }
        let now = self.channel.clock().now_ms();
        let outcome = if elapsed_ms(now, self.last_poll) > self.config.poll_interval_ms {
            let outcome = self.poll_location();
            self.last_poll = self.channel.clock().now_ms();
            Some(outcome)
        } else {
            None
        };
        let pending = self.channel.drain();
        self.sentences.feed(&pending, &mut self.fix);
        outcome
    }

    fn poll_location(&mut self) -> FixOutcome {
        let reply = self.exchange(CMD_LOCATION, LOCATION_TIMEOUT_MS);
        let outcome = classify(&reply);
        let status = match outcome {
            FixOutcome::Error => {
                self.fix.valid = false;
                "Location error"
            }
            FixOutcome::NoFix => {
                self.fix.valid = false;
                "No fix"
            }
            FixOutcome::Candidate => {
                let reading = parse_location(&reply);
                self.fix.apply(&reading);
                if !self.fix.valid {
                    "Invalid coordinates"
                } else {
                    log::info!("Fix: {:.6}, {:.6}", self.fix.latitude, self.fix.longitude);
                    self.log_fix();
                    if self.config.lon_plausible(reading.longitude) {
                        "Fix acquired"
                    } else {
                        log::warn!(
                            "Longitude {:.6} outside expected band [{}, {}]",
                            reading.longitude,
                            self.config.lon_min,
                            self.config.lon_max
                        );
                        "Fix acquired, longitude out of band"
                    }
                }
            }
            FixOutcome::Unrecognized => {
                log::debug!("Unrecognized location reply: {:?}", reply);
                "Unrecognized response"
            }
        };
        let tick = self.channel.clock().now_ms();
        self.diagnostics.record_poll(&reply, status, tick);
        outcome
    }

    fn log_fix(&mut self) {
        let line = format!(
            "{},{:.6},{:.6}",
            self.channel.clock().wall_time().format("%Y-%m-%d %H:%M:%S"),
            self.fix.latitude,
            self.fix.longitude
        );
        if let Err(e) = self.store.append_line(&self.config.gps_log_file, &line) {
            log::warn!("Failed to log fix: {e}");
        }
    }

    /// Send a command, record it in the diagnostics, and return the reply
    /// with any interleaved position sentences taken out
    pub(crate) fn exchange(&mut self, cmd: &str, timeout_ms: u32) -> String {
        self.exchange_until(cmd, timeout_ms, |_| false)
    }

    pub(crate) fn exchange_until<F>(&mut self, cmd: &str, timeout_ms: u32, done: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let raw = self.channel.send_command_until(cmd, timeout_ms, done);
        self.diagnostics.record_exchange(cmd, &raw);
        self.sentences.split_from_reply(&raw, &mut self.fix)
    }

    /// Copy of the latest fix
    pub fn get_fix(&self) -> FixData {
        self.fix.clone()
    }

    /// Copy of the diagnostics record
    pub fn get_diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.clone()
    }

    /// Copy of the recent passive sentences
    pub fn get_sentence_history(&self) -> SentenceHistory {
        self.sentences.history().clone()
    }

    /// True if the latest fix is valid
    pub fn is_valid(&self) -> bool {
        self.fix.valid
    }

    /// Current module state
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> &GpsConfig {
        &self.config
    }

    /// `"lat,lon"` with four decimals, or [`NO_FIX_TEXT`]
    pub fn location_string(&self) -> String {
        if self.fix.valid {
            format!("{:.4},{:.4}", self.fix.latitude, self.fix.longitude)
        } else {
            NO_FIX_TEXT.to_string()
        }
    }

    /// Place name saved by the last successful lookup, empty if there never was one
    pub fn load_cached_place_name(&mut self) -> String {
        match load_place_name(&mut self.store, &self.config.location_cache_file) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Failed to read location cache: {e}");
                String::new()
            }
        }
    }
}

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    driver::A9gGps,
    location::ACK_TOKEN,
    serial::{ControlLines, SerialTransport, MODEM_BAUD},
    store::PersistentStore,
};

const CMD_PROBE: &str = "AT";
const CMD_GPS_ON: &str = "AT+GPS=1";
const CMD_GPS_OFF: &str = "AT+GPS=0";
const CMD_GPS_STATUS: &str = "AT+GPS?";
/// Emit passive sentences every 10 seconds
const CMD_GPS_READ_RATE: &str = "AT+GPSRD=10";

const PROBE_TIMEOUT_MS: u32 = 1000;
const PROBE_ATTEMPTS: usize = 5;
const PROBE_SPACING_MS: u32 = 500;
const POWER_CYCLES: usize = 2;
const POWER_KEY_PULSE_MS: u32 = 3000;
const POWER_SETTLE_MS: u32 = 5000;
const GPS_SWITCH_TIMEOUT_MS: u32 = 2000;
const GPS_QUERY_TIMEOUT_MS: u32 = 1000;

lazy_static! {
    static ref GPS_STATUS: Regex = Regex::new(r"\+GPS:\s*(?P<on>\d)").expect("Failed to compile regex");
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Power and liveness state of the module
pub enum ModuleState {
    /// Unpowered, or the last power cycle got no answer
    Off,
    /// Power sequence in progress
    PoweringOn,
    /// Waiting for the module to acknowledge a liveness probe
    Probing,
    /// Responsive; polling and lookups are allowed
    Ready,
    /// Never answered after every power cycle
    Failed,
}

/// GPS power as reported by the status query; `None` if the reply has no status
fn gps_status(reply: &str) -> Option<bool> {
    GPS_STATUS.captures(reply).map(|caps| &caps["on"] != "0")
}

fn status_text(status: Option<bool>) -> &'static str {
    match status {
        Some(true) => "GPS On",
        Some(false) => "GPS Off",
        None => "GPS Status Unknown",
    }
}

impl<T, C, S> A9gGps<T, C, S>
where
    T: SerialTransport + ControlLines,
    C: Clock,
    S: PersistentStore,
{
    /// Open the serial link, power the module and wait for it to answer.
    ///
    /// The module gets two full power cycles of five probes each. On success
    /// the GPS is switched on and `true` is returned; `false` means no
    /// positioning is available this session.
    pub fn begin(&mut self) -> bool {
        if let Err(e) = self.channel.transport_mut().begin(MODEM_BAUD) {
            log::error!("Cannot open modem link: {e}");
            self.state = ModuleState::Failed;
            self.diagnostics.set_status("Serial link unavailable");
            return false;
        }
        log::info!("Initializing module...");
        for cycle in 1..=POWER_CYCLES {
            self.state = ModuleState::PoweringOn;
            self.power_sequence();
            self.state = ModuleState::Probing;
            if self.probe() {
                log::info!("Module ready");
                self.state = ModuleState::Ready;
                self.diagnostics.set_status("Module ready");
                self.turn_gps_on();
                return true;
            }
            self.state = ModuleState::Off;
            log::warn!("Module not responding after power cycle {cycle}/{POWER_CYCLES}");
        }
        log::error!("Module failed to initialize");
        self.state = ModuleState::Failed;
        self.diagnostics.set_status("Module not responding");
        false
    }

    fn power_sequence(&mut self) {
        let lines = self.channel.transport_mut();
        lines.set_reset(false);
        lines.set_low_power(true);
        lines.set_power_key(true);
        lines.set_power_key(false);
        self.channel.clock_mut().delay_ms(POWER_KEY_PULSE_MS);
        self.channel.transport_mut().set_power_key(true);
        self.channel.clock_mut().delay_ms(POWER_SETTLE_MS);
    }

    fn probe(&mut self) -> bool {
        for attempt in 1..=PROBE_ATTEMPTS {
            let reply =
                self.exchange_until(CMD_PROBE, PROBE_TIMEOUT_MS, |r| r.contains(ACK_TOKEN));
            if reply.contains(ACK_TOKEN) {
                log::debug!("Probe answered on attempt {attempt}");
                return true;
            }
            self.channel.clock_mut().delay_ms(PROBE_SPACING_MS);
        }
        false
    }

    /// Switch the GPS receiver on and enable periodic passive sentences
    pub fn turn_gps_on(&mut self) {
        if self.state != ModuleState::Ready {
            log::warn!("GPS enable ignored, module is {:?}", self.state);
            return;
        }
        log::info!("Turning on GPS...");
        self.exchange(CMD_GPS_ON, GPS_SWITCH_TIMEOUT_MS);
        let reply = self.exchange(CMD_GPS_STATUS, GPS_QUERY_TIMEOUT_MS);
        self.diagnostics.set_status(status_text(gps_status(&reply)));
        self.exchange(CMD_GPS_READ_RATE, GPS_QUERY_TIMEOUT_MS);
    }

    /// Switch the GPS receiver off
    pub fn turn_gps_off(&mut self) {
        if self.state != ModuleState::Ready {
            log::warn!("GPS disable ignored, module is {:?}", self.state);
            return;
        }
        log::info!("Turning off GPS...");
        self.exchange(CMD_GPS_OFF, GPS_SWITCH_TIMEOUT_MS);
        self.diagnostics.set_status("GPS Off");
    }

    /// Query the GPS power state and reflect it in the status text
    pub fn refresh_diagnostics(&mut self) {
        if self.state != ModuleState::Ready {
            return;
        }
        let reply = self.exchange(CMD_GPS_STATUS, GPS_QUERY_TIMEOUT_MS);
        self.diagnostics.set_status(status_text(gps_status(&reply)));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::GpsConfig,
        location::FixData,
        mock::{MemoryStore, MockClock, MockModem},
    };

    fn gps(modem: &MockModem) -> A9gGps<MockModem, MockClock, MemoryStore> {
        A9gGps::new(
            modem.clone(),
            MockClock::new(),
            MemoryStore::new(),
            GpsConfig::default(),
        )
    }

    #[test]
    fn dead_module_gets_two_cycles_of_five_probes() {
        let modem = MockModem::new();
        let mut gps = gps(&modem);
        assert!(!gps.begin());
        assert_eq!(gps.state(), ModuleState::Failed);
        assert_eq!(modem.count(CMD_PROBE), 10);
        assert_eq!(modem.power_pulses(), 2);
        assert_eq!(modem.baud(), Some(115200));
        assert_eq!(gps.get_diagnostics().status_text(), "Module not responding");
        assert_eq!(modem.count(CMD_GPS_ON), 0);
    }

    #[test]
    fn second_power_cycle_recovers() {
        let modem = MockModem::new();
        for _ in 0..7 {
            modem.respond_once(CMD_PROBE, "\r\n");
        }
        modem.respond(CMD_PROBE, "AT\r\nOK\r\n");
        modem.respond(CMD_GPS_STATUS, "\r\n+GPS: 1\r\n\r\nOK\r\n");
        let mut gps = gps(&modem);
        assert!(gps.begin());
        assert_eq!(gps.state(), ModuleState::Ready);
        assert_eq!(modem.count(CMD_PROBE), 8);
        assert_eq!(modem.power_pulses(), 2);
        assert_eq!(gps.get_diagnostics().status_text(), "GPS On");
    }

    #[test]
    fn ready_module_enables_gps() {
        let modem = MockModem::new();
        modem.respond(CMD_PROBE, "OK\r\n");
        let mut gps = gps(&modem);
        assert!(gps.begin());
        assert_eq!(modem.power_pulses(), 1);
        assert_eq!(
            modem.sent(),
            vec![CMD_PROBE, CMD_GPS_ON, CMD_GPS_STATUS, CMD_GPS_READ_RATE]
        );
        assert_eq!(gps.get_diagnostics().status_text(), "GPS Status Unknown");
        assert_eq!(gps.get_diagnostics().last_command(), CMD_GPS_READ_RATE);
    }

    #[test]
    fn unopenable_link_fails_fast() {
        let modem = MockModem::new();
        modem.refuse_open();
        let mut gps = gps(&modem);
        assert!(!gps.begin());
        assert_eq!(gps.state(), ModuleState::Failed);
        assert!(modem.sent().is_empty());
    }

    #[test]
    fn gps_off_and_refresh() {
        let modem = MockModem::new();
        modem.respond(CMD_PROBE, "OK\r\n");
        modem.respond(CMD_GPS_STATUS, "+GPS: 0\r\nOK\r\n");
        let mut gps = gps(&modem);
        assert!(gps.begin());
        gps.fix = FixData {
            valid: true,
            latitude: 25.0,
            longitude: 85.0,
            ..Default::default()
        };
        modem.clear_sent();
        gps.turn_gps_off();
        assert_eq!(modem.sent(), vec![CMD_GPS_OFF]);
        assert!(gps.is_valid());
        assert_eq!(gps.get_fix().latitude, 25.0);
        assert_eq!(gps.get_diagnostics().status_text(), "GPS Off");
        gps.refresh_diagnostics();
        assert_eq!(modem.count(CMD_GPS_STATUS), 1);
        assert_eq!(gps.get_diagnostics().status_text(), "GPS Off");
    }

    #[test]
    fn status_parsing() {
        assert_eq!(gps_status("+GPS: 1\r\nOK"), Some(true));
        assert_eq!(gps_status("+GPS:0"), Some(false));
        assert_eq!(gps_status("OK"), None);
    }
}

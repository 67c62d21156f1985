#![deny(missing_docs)]
//! # A9G GPS Driver
//! A protocol driver for the A9G cellular/GPS module over a serial AT-command link.
//!
//! Powers the module up and probes it, polls it for a location fix, picks
//! satellite count and altitude out of passive NMEA GGA sentences, and
//! resolves a fix to a place name through the modem's HTTP client, caching
//! the result on disk.
mod channel;
mod clock;
mod config;
mod diagnostics;
mod driver;
mod geocode;
mod lifecycle;
mod location;
mod nmea;
mod serial;
mod store;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::CommandChannel;
pub use clock::{elapsed_ms, Clock, SystemClock};
pub use config::GpsConfig;
pub use diagnostics::DiagnosticsSnapshot;
pub use driver::{A9gGps, NO_FIX_TEXT};
pub use geocode::{extract_place_name, geocode_url, HTTP_INIT_ERROR, NOT_READY_TEXT, PLACE_UNKNOWN};
pub use lifecycle::ModuleState;
pub use location::{
    classify, parse_location, FixData, FixOutcome, LatHemisphere, LocationReading, LonHemisphere,
};
pub use nmea::{SentenceHistory, HISTORY_CAPACITY, SENTENCE_MAX_LEN};
pub use serial::{ControlLines, SerialModem, SerialTransport, TransportError, MODEM_BAUD};
pub use store::{FsStore, PersistentStore, StoreError};

/// Driver wired to a host serial port, the system clock and a directory store
pub type HostGps = A9gGps<SerialModem, SystemClock, FsStore>;

#[cfg(test)]
mod test {
    #[test]
    fn cache_round_trip_across_instances() {
        use super::*;
        use crate::mock::{MockClock, MockModem};
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let modem = MockModem::new();
        modem.respond("AT", "OK\r\n");
        modem.respond("AT+LOCATION=2", "+LOCATION: 25.594095,85.137566\r\nOK\r\n");
        modem.respond("AT+HTTPINIT", "OK\r\n");
        modem.respond("AT+HTTPACTION=0", "OK\r\n+HTTPACTION: 0,200,40\r\n");
        modem.respond(
            "AT+HTTPREAD",
            "+HTTPREAD: 40\r\n{\"display_name\":\"Patna, Bihar, India\"}\r\nOK\r\n",
        );
        let clock = MockClock::new();
        let mut gps = A9gGps::new(
            modem.clone(),
            clock.clone(),
            FsStore::new(dir.path()).unwrap(),
            GpsConfig::default(),
        );
        assert!(gps.begin());
        clock.advance(5001);
        assert_eq!(gps.update(), Some(FixOutcome::Candidate));
        assert_eq!(gps.resolve_place_name(), "Patna, Bihar, India");
        drop(gps);

        let mut fresh = A9gGps::new(
            MockModem::new(),
            MockClock::new(),
            FsStore::new(dir.path()).unwrap(),
            GpsConfig::default(),
        );
        assert_eq!(fresh.load_cached_place_name(), "Patna, Bihar, India");
        let log = std::fs::read_to_string(dir.path().join("gps_log.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.ends_with(",25.594095,85.137566\n"));
    }
}

use crate::{
    clock::Clock,
    driver::{A9gGps, NO_FIX_TEXT},
    lifecycle::ModuleState,
    location::{ACK_TOKEN, ERROR_TOKEN},
    serial::{ControlLines, SerialTransport},
    store::{save_place_name, PersistentStore},
};

const CMD_HTTP_TERM: &str = "AT+HTTPTERM";
const CMD_HTTP_INIT: &str = "AT+HTTPINIT";
const CMD_HTTP_BEARER: &str = "AT+HTTPPARA=\"CID\",1";
const CMD_HTTP_CONTENT: &str = "AT+HTTPPARA=\"CONTENT\",\"application/json\"";
const CMD_HTTP_GET: &str = "AT+HTTPACTION=0";
const CMD_HTTP_HEAD: &str = "AT+HTTPHEAD";
const CMD_HTTP_READ: &str = "AT+HTTPREAD";

const HTTP_ACTION_REPORT: &str = "+HTTPACTION:";
const PLACE_KEY: &str = "\"display_name\"";

const TERM_TIMEOUT_MS: u32 = 1000;
const INIT_TIMEOUT_MS: u32 = 2000;
const PARAM_TIMEOUT_MS: u32 = 1000;
const URL_TIMEOUT_MS: u32 = 2000;
const ACTION_TIMEOUT_MS: u32 = 15000;
const HEAD_TIMEOUT_MS: u32 = 2000;
const READ_TIMEOUT_MS: u32 = 5000;

/// Result of a lookup whose reply carried no place name
pub const PLACE_UNKNOWN: &str = "Unknown";
/// Result of a lookup whose HTTP session could not be opened
pub const HTTP_INIT_ERROR: &str = "HTTP Init Error";
/// Result of a lookup attempted before the module is ready
pub const NOT_READY_TEXT: &str = "GPS Not Ready";

/// Reverse-geocoding request URL for a coordinate pair
pub fn geocode_url(latitude: f64, longitude: f64) -> String {
    format!(
        "http://nominatim.openstreetmap.org/reverse?format=json&lat={latitude:.6}&lon={longitude:.6}&zoom=10"
    )
}

/// Pull the quoted value that follows the place-name key.
///
/// A plain substring scan tied to the lookup service's reply shape, not a
/// JSON parser.
pub fn extract_place_name(body: &str) -> Option<String> {
    let after_key = &body[body.find(PLACE_KEY)? + PLACE_KEY.len()..];
    let value = &after_key[after_key.find('"')? + 1..];
    let name = &value[..value.find('"')?];
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl<T, C, S> A9gGps<T, C, S>
where
    T: SerialTransport + ControlLines,
    C: Clock,
    S: PersistentStore,
{
    /// Resolve the current fix to a place name through the modem's HTTP client.
    ///
    /// Blocks for up to about half a minute. Failures come back as sentinel
    /// text: [`HTTP_INIT_ERROR`], [`PLACE_UNKNOWN`], [`NO_FIX_TEXT`] or
    /// [`NOT_READY_TEXT`]. A resolved name is also written to the location cache.
    pub fn resolve_place_name(&mut self) -> String {
        if self.state != ModuleState::Ready {
            return NOT_READY_TEXT.to_string();
        }
        if !self.fix.valid {
            return NO_FIX_TEXT.to_string();
        }
        let url = geocode_url(self.fix.latitude, self.fix.longitude);
        log::info!("Resolving place name for {url}");

        self.exchange(CMD_HTTP_TERM, TERM_TIMEOUT_MS);
        let reply =
            self.exchange_until(CMD_HTTP_INIT, INIT_TIMEOUT_MS, |r| r.contains(ACK_TOKEN));
        if !reply.contains(ACK_TOKEN) {
            log::warn!("HTTP session init failed: {:?}", reply);
            self.diagnostics.set_status(HTTP_INIT_ERROR);
            return HTTP_INIT_ERROR.to_string();
        }

        self.exchange(CMD_HTTP_BEARER, PARAM_TIMEOUT_MS);
        self.exchange(&format!("AT+HTTPPARA=\"URL\",\"{url}\""), URL_TIMEOUT_MS);
        self.exchange(CMD_HTTP_CONTENT, PARAM_TIMEOUT_MS);

        let action = self.exchange_until(CMD_HTTP_GET, ACTION_TIMEOUT_MS, |r| {
            r.contains(HTTP_ACTION_REPORT) || r.contains(ERROR_TOKEN)
        });
        log::debug!("HTTP action report: {:?}", action.trim());
        self.exchange(CMD_HTTP_HEAD, HEAD_TIMEOUT_MS);
        let body = self.exchange(CMD_HTTP_READ, READ_TIMEOUT_MS);

        let place = match extract_place_name(&body) {
            Some(name) => {
                if let Err(e) =
                    save_place_name(&mut self.store, &self.config.location_cache_file, &name)
                {
                    log::warn!("Failed to cache place name: {e}");
                }
                name
            }
            None => PLACE_UNKNOWN.to_string(),
        };
        self.exchange(CMD_HTTP_TERM, TERM_TIMEOUT_MS);
        log::info!("Place name: {place}");
        place
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

    const BODY: &str = "\r\n+HTTPREAD: 97\r\n{\"place_id\":1,\"lat\":\"25.6\",\"display_name\":\"Patna, Bihar, India\",\"address\":{}}\r\nOK\r\n";

    fn with_fix() -> (A9gGps<MockModem, MockClock, MemoryStore>, MockModem, MemoryStore) {
        let modem = MockModem::new();
        let store = MemoryStore::new();
        let mut gps = A9gGps::new(
            modem.clone(),
            MockClock::new(),
            store.clone(),
            GpsConfig::default(),
        );
        gps.state = ModuleState::Ready;
        gps.fix = FixData {
            valid: true,
            latitude: 25.594095,
            longitude: 85.137566,
            ..Default::default()
        };
        (gps, modem, store)
    }

    fn url_cmd() -> String {
        format!("AT+HTTPPARA=\"URL\",\"{}\"", geocode_url(25.594095, 85.137566))
    }

    #[test]
    fn full_lookup_is_cached() {
        let (mut gps, modem, store) = with_fix();
        modem.respond(CMD_HTTP_INIT, "\r\nOK\r\n");
        modem.respond(CMD_HTTP_GET, "\r\nOK\r\n\r\n+HTTPACTION: 0,200,97\r\n");
        modem.respond(CMD_HTTP_READ, BODY);
        assert_eq!(gps.resolve_place_name(), "Patna, Bihar, India");
        assert_eq!(
            modem.sent(),
            vec![
                CMD_HTTP_TERM.to_string(),
                CMD_HTTP_INIT.to_string(),
                CMD_HTTP_BEARER.to_string(),
                url_cmd(),
                CMD_HTTP_CONTENT.to_string(),
                CMD_HTTP_GET.to_string(),
                CMD_HTTP_HEAD.to_string(),
                CMD_HTTP_READ.to_string(),
                CMD_HTTP_TERM.to_string(),
            ]
        );
        assert_eq!(store.lines("location_cache.txt"), vec!["Patna, Bihar, India"]);
        assert_eq!(gps.load_cached_place_name(), "Patna, Bihar, India");
    }

    #[test]
    fn init_failure_aborts() {
        let (mut gps, modem, store) = with_fix();
        modem.respond(CMD_HTTP_INIT, "\r\nERROR\r\n");
        assert_eq!(gps.resolve_place_name(), HTTP_INIT_ERROR);
        assert_eq!(modem.sent(), vec![CMD_HTTP_TERM, CMD_HTTP_INIT]);
        assert!(!store.exists("location_cache.txt"));
    }

    #[test]
    fn missing_body_is_unknown() {
        let (mut gps, modem, store) = with_fix();
        modem.respond(CMD_HTTP_INIT, "OK\r\n");
        assert_eq!(gps.resolve_place_name(), PLACE_UNKNOWN);
        assert_eq!(modem.count(CMD_HTTP_TERM), 2);
        assert!(!store.exists("location_cache.txt"));
    }

    #[test]
    fn needs_a_fix_and_a_module() {
        let (mut gps, modem, _) = with_fix();
        gps.fix.valid = false;
        assert_eq!(gps.resolve_place_name(), NO_FIX_TEXT);
        gps.fix.valid = true;
        gps.state = ModuleState::Failed;
        assert_eq!(gps.resolve_place_name(), NOT_READY_TEXT);
        assert!(modem.sent().is_empty());
    }

    #[test]
    fn narrow_scan() {
        assert_eq!(
            extract_place_name("{\"display_name\": \"Gaya\"}").as_deref(),
            Some("Gaya")
        );
        assert_eq!(extract_place_name("{\"name\":\"Gaya\"}"), None);
        assert_eq!(extract_place_name("{\"display_name\":"), None);
        assert_eq!(extract_place_name("{\"display_name\":\"Gaya"), None);
        assert_eq!(extract_place_name("{\"display_name\":\"\"}"), None);
    }

    #[test]
    fn url_template() {
        assert_eq!(
            geocode_url(25.123456, 85.234567),
            "http://nominatim.openstreetmap.org/reverse?format=json&lat=25.123456&lon=85.234567&zoom=10"
        );
    }
}

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::bounded;

/// Acknowledgement token closing a successful reply
pub const ACK_TOKEN: &str = "OK";
/// Token reporting a rejected command
pub const ERROR_TOKEN: &str = "ERROR";
/// Prefix of the verbose location reply
pub const LOCATION_MARKER: &str = "+LOCATION:";
/// Coordinates the modem reports while it has no fix
pub const NO_FIX_SENTINEL: &str = "0.000000,0.000000";

const LAST_UPDATE_MAX: usize = 19;

lazy_static! {
    /// Terse `lat,lon` reply line
    static ref TERSE_LOCATION: Regex =
        Regex::new(r"(?m)^[ \t]*-?\d+\.\d+,[ \t]*-?\d+\.\d+").expect("Failed to compile regex");
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Latitude hemisphere
pub enum LatHemisphere {
    /// North of the equator
    N,
    /// South of the equator
    S,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Longitude hemisphere
pub enum LonHemisphere {
    /// East of the prime meridian
    E,
    /// West of the prime meridian
    W,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Latest known position
pub struct FixData {
    /// True only when both coordinates are non-zero and the last poll parsed cleanly
    pub valid: bool,
    /// Signed latitude in degrees
    pub latitude: f64,
    /// Signed longitude in degrees
    pub longitude: f64,
    /// Altitude in meters, from passive sentences
    pub altitude: f64,
    /// Satellites in use, from passive sentences
    pub satellite_count: u8,
    /// Informational; the sign of `latitude` is authoritative
    pub hemisphere_lat: LatHemisphere,
    /// Informational; the sign of `longitude` is authoritative
    pub hemisphere_lon: LonHemisphere,
    /// Modem-supplied date/time text, opaque
    pub last_update: String,
}

impl Default for FixData {
    fn default() -> Self {
        Self {
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            satellite_count: 0,
            hemisphere_lat: LatHemisphere::N,
            hemisphere_lon: LonHemisphere::E,
            last_update: "No Fix".into(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Classification of a location-query reply
pub enum FixOutcome {
    /// The modem rejected the query
    Error,
    /// The modem reported the zero-coordinate sentinel
    NoFix,
    /// The reply carries location data and was handed to the parser
    Candidate,
    /// None of the above; the previous fix is kept
    Unrecognized,
}

/// Classify a location-query reply. The error token wins over everything,
/// then the sentinel, then the location marker.
pub fn classify(response: &str) -> FixOutcome {
    if response.contains(ERROR_TOKEN) {
        FixOutcome::Error
    } else if response.contains(NO_FIX_SENTINEL) {
        FixOutcome::NoFix
    } else if response.contains(LOCATION_MARKER) || TERSE_LOCATION.is_match(response) {
        FixOutcome::Candidate
    } else {
        FixOutcome::Unrecognized
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Coordinates parsed out of a location reply
pub struct LocationReading {
    /// Latitude in degrees, 0.0 if unparsable
    pub latitude: f64,
    /// Longitude in degrees, 0.0 if unparsable
    pub longitude: f64,
    /// Trailing date/time text, if the reply had one
    pub timestamp: Option<String>,
}

impl LocationReading {
    /// Both coordinates are non-zero
    pub fn is_valid(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

fn parse_coord(s: &str) -> f64 {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Parse the coordinates out of a reply that classified as [`FixOutcome::Candidate`]
pub fn parse_location(response: &str) -> LocationReading {
    let mut text = response;
    if let Some(i) = text.find(ACK_TOKEN) {
        text = &text[..i];
    }
    if let Some(i) = text.find(LOCATION_MARKER) {
        text = &text[i + LOCATION_MARKER.len()..];
    } else if let Some(m) = TERSE_LOCATION.find(text) {
        // skips a command echo preceding the terse form
        text = &text[m.start()..];
    }
    let cleaned: String = text.trim().chars().filter(|&c| c != '\r').collect();
    let line = cleaned.lines().next().unwrap_or_default();

    let mut fields = line.splitn(3, ',');
    let latitude = fields.next().map(parse_coord).unwrap_or_default();
    let longitude = fields.next().map(parse_coord).unwrap_or_default();
    let timestamp = fields
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| bounded(s, LAST_UPDATE_MAX));
    LocationReading {
        latitude,
        longitude,
        timestamp,
    }
}

impl FixData {
    /// Take over the coordinates of a parsed reading
    pub(crate) fn apply(&mut self, reading: &LocationReading) {
        self.latitude = reading.latitude;
        self.longitude = reading.longitude;
        self.hemisphere_lat = if reading.latitude < 0.0 {
            LatHemisphere::S
        } else {
            LatHemisphere::N
        };
        self.hemisphere_lon = if reading.longitude < 0.0 {
            LonHemisphere::W
        } else {
            LonHemisphere::E
        };
        if let Some(ts) = &reading.timestamp {
            self.last_update = ts.clone();
        }
        self.valid = reading.is_valid();
    }
}

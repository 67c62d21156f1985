use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Driver policy values
pub struct GpsConfig {
    /// Minimum time between location polls, in milliseconds
    pub poll_interval_ms: u32,
    /// Lowest longitude considered plausible, in degrees
    pub lon_min: f64,
    /// Highest longitude considered plausible, in degrees
    pub lon_max: f64,
    /// Append-only log of accepted fixes
    pub gps_log_file: String,
    /// Single-line cache of the last resolved place name
    pub location_cache_file: String,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            lon_min: 68.0,
            lon_max: 98.0,
            gps_log_file: "gps_log.txt".into(),
            location_cache_file: "location_cache.txt".into(),
        }
    }
}

impl GpsConfig {
    /// True if `lon` lies within the plausibility band
    pub fn lon_plausible(&self, lon: f64) -> bool {
        (self.lon_min..=self.lon_max).contains(&lon)
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn longitude_band() {
        use super::*;
        let cfg = GpsConfig::default();
        assert!(cfg.lon_plausible(85.234567));
        assert!(cfg.lon_plausible(68.0));
        assert!(!cfg.lon_plausible(151.2));
        assert!(!cfg.lon_plausible(-85.2));
    }
}

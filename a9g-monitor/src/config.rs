use std::path::{Path, PathBuf};

use a9g_gps::GpsConfig;
use argh::FromArgs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(FromArgs, Serialize, Deserialize, Debug, PartialEq)]
/// Console monitor for an A9G GPS module
pub struct MonitorCfg {
    /// serial device; taken from the stored defaults if omitted
    #[argh(positional)]
    pub serial_port: Option<String>,
    /// milliseconds between location polls
    #[argh(option, default = "5000")]
    pub poll_interval: u32,
    /// lowest plausible longitude in degrees
    #[argh(option, default = "68.0")]
    pub lon_min: f64,
    /// highest plausible longitude in degrees
    #[argh(option, default = "98.0")]
    pub lon_max: f64,
    /// directory for the fix log and place-name cache
    #[argh(option, default = "PathBuf::from(\".\")")]
    pub data_dir: PathBuf,
    /// resolve the place name once a fix is available
    #[argh(switch)]
    pub resolve: bool,
    /// print reports as JSON
    #[argh(switch)]
    pub json: bool,
    /// print the recent NMEA sentences with each report
    #[argh(switch)]
    pub nmea: bool,
    /// read options from this JSON5 file
    #[argh(option)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
    /// store the options as the defaults
    #[argh(switch)]
    #[serde(skip)]
    pub save_config: bool,
}

impl MonitorCfg {
    /// Driver settings derived from the options
    pub fn gps_config(&self) -> GpsConfig {
        GpsConfig {
            poll_interval_ms: self.poll_interval,
            lon_min: self.lon_min,
            lon_max: self.lon_max,
            ..Default::default()
        }
    }

    /// Pick the effective options: an explicit file, else the stored
    /// defaults when no serial device was given, else the command line
    pub fn resolve(self) -> Result<Self, std::io::Error> {
        let save_config = self.save_config;
        let mut cfg = match self.config.clone() {
            Some(path) => Self::load_file(&path)?,
            None if self.serial_port.is_none() => Self::load_default()?,
            None => self,
        };
        cfg.save_config = save_config;
        Ok(cfg)
    }

    /// Store the configuration in the default location
    pub fn store_default(&self) -> Result<(), std::io::Error> {
        self.store_in(&get_default_path())
    }

    /// Load the configuration from the default location
    pub fn load_default() -> Result<Self, std::io::Error> {
        Self::load_from(&get_default_path())
    }

    fn store_in(&self, dir: &Path) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(self)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
        )
    }

    fn load_from(dir: &Path) -> Result<Self, std::io::Error> {
        let data = std::fs::read(dir.join("config.json"))?;
        serde_json::from_slice(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Load a hand-written JSON5 configuration file
    pub fn load_file(path: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        json5::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn get_default_path() -> PathBuf {
    if let Some(path) = ProjectDirs::from("", "", "a9g_monitor") {
        path.config_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> MonitorCfg {
        MonitorCfg {
            serial_port: Some("/dev/ttyUSB1".into()),
            poll_interval: 2000,
            lon_min: -10.0,
            lon_max: 40.0,
            data_dir: PathBuf::from("/var/lib/a9g"),
            resolve: true,
            json: false,
            nmea: true,
            config: None,
            save_config: false,
        }
    }

    #[test]
    fn stored_config_round_trips() {
        let dir = tempdir().unwrap();
        let cfg = sample();
        cfg.store_in(dir.path()).unwrap();
        assert_eq!(MonitorCfg::load_from(dir.path()).unwrap(), cfg);
    }

    #[test]
    fn json5_file_with_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("monitor.json5");
        std::fs::write(
            &path,
            r#"{
                // adapter on the bench rig
                serial_port: "/dev/ttyACM0",
                poll_interval: 10000,
                lon_min: 68.0,
                lon_max: 98.0,
                data_dir: "data",
                resolve: false,
                json: true,
                nmea: false,
            }"#,
        )
        .unwrap();
        let cfg = MonitorCfg::load_file(&path).unwrap();
        assert_eq!(cfg.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cfg.gps_config().poll_interval_ms, 10000);
        assert!(cfg.json);
        assert_eq!(cfg.gps_config().location_cache_file, "location_cache.txt");
    }

    #[test]
    fn explicit_file_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("monitor.json5");
        std::fs::write(
            &path,
            r#"{serial_port: "/dev/ttyS3", poll_interval: 1000, lon_min: 0.0, lon_max: 1.0,
                data_dir: ".", resolve: false, json: false, nmea: false}"#,
        )
        .unwrap();
        let mut cli = sample();
        cli.config = Some(path);
        cli.save_config = true;
        let cfg = cli.resolve().unwrap();
        assert_eq!(cfg.serial_port.as_deref(), Some("/dev/ttyS3"));
        assert!(cfg.save_config);
        assert_eq!(cfg.config, None);
    }
}

#![deny(missing_docs)]
//! # Monitor
mod config;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use a9g_gps::{
    A9gGps, DiagnosticsSnapshot, FixData, FixOutcome, FsStore, HostGps, SerialModem, SystemClock,
    HTTP_INIT_ERROR, PLACE_UNKNOWN,
};
use chrono::Utc;
use crossterm::terminal;
use serde::Serialize;

pub use config::MonitorCfg;

/// Main-loop tick
const TICK: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct Report<'a> {
    time: String,
    outcome: FixOutcome,
    fix: &'a FixData,
    diagnostics: &'a DiagnosticsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    sentences: Option<Vec<String>>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cfg: MonitorCfg = argh::from_env();
    let cfg = cfg.resolve().expect("Failed to load configuration");
    if cfg.save_config {
        cfg.store_default().expect("Failed to store configuration");
        log::info!("Stored configuration as default");
    }
    let Some(port) = cfg.serial_port.clone() else {
        eprintln!("No serial device given and none configured");
        std::process::exit(1);
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .expect("Failed to set Ctrl-C handler");
    }

    let store = FsStore::new(&cfg.data_dir).expect("Failed to create data directory");
    log::info!("Data directory: {}", store.root_dir().display());
    let mut gps: HostGps = A9gGps::new(
        SerialModem::new(port),
        SystemClock::new(),
        store,
        cfg.gps_config(),
    );
    let cached = gps.load_cached_place_name();
    if !cached.is_empty() {
        log::info!("Last resolved place: {cached}");
    }
    log::info!("Polling every {} ms", gps.config().poll_interval_ms);
    if !gps.begin() {
        eprintln!("A9G module did not respond, no positioning this session");
        return;
    }

    let mut resolved = false;
    while running.load(Ordering::SeqCst) {
        if let Some(outcome) = gps.update() {
            report(&gps, outcome, &cfg);
        }
        if cfg.resolve && !resolved && gps.is_valid() {
            let place = gps.resolve_place_name();
            println!("Place: {place}");
            // retry on the next tick only if the session never opened
            resolved = place != HTTP_INIT_ERROR;
            if place == PLACE_UNKNOWN {
                log::warn!("Lookup returned no place name");
            }
        }
        std::thread::sleep(TICK);
    }
    log::info!("Shutting down");
    gps.turn_gps_off();
}

fn report(gps: &HostGps, outcome: FixOutcome, cfg: &MonitorCfg) {
    let fix = gps.get_fix();
    let diag = gps.get_diagnostics();
    let sentences = cfg.nmea.then(|| {
        gps.get_sentence_history()
            .entries()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    });
    if cfg.json {
        let report = Report {
            time: Utc::now().to_rfc3339(),
            outcome,
            fix: &fix,
            diagnostics: &diag,
            sentences,
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("Could not encode report: {e}"),
        }
        return;
    }
    let width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);
    println!(
        "\n{:-<width$}",
        format!(
            "{} {:?} [{}] ",
            Utc::now().format("%Y-%m-%d %H:%M:%S%Z"),
            outcome,
            diag.fix_attempts()
        ),
        width = width
    );
    println!(
        "\t{} | alt {:.1} m | {} sats | {}",
        gps.location_string(),
        fix.altitude,
        fix.satellite_count,
        fix.last_update
    );
    println!("\tstatus: {}", diag.status_text());
    if let Some(sentences) = sentences {
        for s in sentences {
            println!("\t{s}");
        }
    }
    println!("{:=<width$}", "", width = width);
}

//! Desktop simulator for the canopy sensor node.
//!
//! Runs a series of wake cycles through the real lifecycle controller with
//! simulated hardware: log files in a host directory, a virtual clock that
//! only jumps when the node sleeps or waits, synthetic sensors, a simulated
//! WiFi link and a loopback collector.
//!
//! # Usage
//!
//! ```text
//! canopy-simulator [--config FILE] [--cycles N] [--state-dir DIR] [--cold]
//!                  [--manual-wake N] [--collector-status CODE] [--no-ntp]
//!                  [--failing-sensor N]
//! ```
//!
//! Retained memory is mirrored to `DIR/retained.bin`, so a later run resumes
//! the cycle counter unless `--cold` simulates a power loss. Accepted readouts
//! end up in `DIR/collector.jsonl`.

mod collector;
mod hardware;
mod medium;
mod sensors;

use std::path::PathBuf;

use canopy::config::NodeConfig;
use canopy::cycle::WakeupCause;
use canopy::http::Endpoint;
use canopy::indicator::StatusLed;
use canopy::lifecycle::{Board, PowerControl, run_cycle};
use canopy::sensors::{SensorChannel, ensure_unique_codes};
use canopy::storage::ReadoutLog;
use clap::Parser;
use log::{error, info};

use collector::{LoopbackCollector, SimNetwork};
use hardware::{RetainedFile, SimLed, SimPower, VirtualClock, VirtualDelay};
use medium::DirMedium;
use sensors::{Quantity, SynthSensor};

const DEFAULT_DEVICE_ID: &str = "canopy-sim";
const DEFAULT_COLLECTOR_URL: &str = "http://localhost:8080/api/readouts";

/// Run canopy wake cycles against simulated hardware.
#[derive(Parser, Debug)]
#[command(name = "canopy-simulator", version)]
struct Options {
    /// JSON node configuration; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of wake cycles to run
    #[arg(long, default_value_t = 6)]
    cycles: u32,

    /// Directory holding retained memory, log files and the collector sink
    #[arg(long, default_value = "sim-state")]
    state_dir: PathBuf,

    /// Simulate a power loss before the first cycle
    #[arg(long)]
    cold: bool,

    /// Cycle that is woken by the manual override pin instead of the timer
    #[arg(long)]
    manual_wake: Option<u32>,

    /// Status the collector answers every upload with
    #[arg(long, default_value_t = 201)]
    collector_status: u16,

    /// Make every time acquisition attempt time out
    #[arg(long)]
    no_ntp: bool,

    /// Make each sensor fail on every n-th read
    #[arg(long)]
    failing_sensor: Option<u32>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = Options::parse();

    let config_text = match &options.config {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?,
        None => String::new(),
    };
    let config = if config_text.is_empty() {
        NodeConfig {
            device_id: DEFAULT_DEVICE_ID,
            collector_url: DEFAULT_COLLECTOR_URL,
            ..NodeConfig::default()
        }
    } else {
        serde_json::from_str(&config_text).map_err(|e| format!("invalid config: {}", e))?
    };
    config.validate().map_err(|e| e.to_string())?;
    let endpoint = Endpoint::parse(config.collector_url).map_err(|e| e.to_string())?;

    std::fs::create_dir_all(&options.state_dir)
        .map_err(|e| format!("cannot create {}: {}", options.state_dir.display(), e))?;

    let mut retained = RetainedFile::open(options.state_dir.join("retained.bin"));
    if options.cold {
        retained.power_loss();
    }

    // RTC memory and the RTC itself survive together; after a power loss the
    // clock starts over from zero.
    let (mut cause, clock) = if retained.holds_state() {
        (WakeupCause::TimerWake, VirtualClock::host_time())
    } else {
        (WakeupCause::ColdBoot, VirtualClock::unset())
    };

    info!(
        "Simulating {} wake cycles for {} -> {}",
        options.cycles, config.device_id, config.collector_url
    );

    let sensor = |quantity| {
        let sensor = SynthSensor::new(quantity, clock.clone());
        match options.failing_sensor {
            Some(n) => sensor.failing_every(n),
            None => sensor,
        }
    };
    let channels = vec![
        SensorChannel::new("TMP", 1, sensor(Quantity::Temperature)),
        SensorChannel::new("HUM", 1, sensor(Quantity::Humidity)),
        SensorChannel::new("LUM", 3, sensor(Quantity::Light)),
    ]
    .into_iter()
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| e.to_string())?;
    ensure_unique_codes(&channels).map_err(|e| e.to_string())?;

    let mut board = Board {
        channels,
        log: ReadoutLog::new(DirMedium::new(options.state_dir.join("logs"))),
        network: SimNetwork::new(
            clock.clone(),
            !config.internet.ssid.is_empty() || options.config.is_none(),
            !options.no_ntp,
        ),
        uploader: LoopbackCollector::new(
            clock.clone(),
            options.state_dir.join("collector.jsonl"),
            options.collector_status,
        ),
        clock: clock.clone(),
        retained,
        delay: VirtualDelay(clock.clone()),
        led: StatusLed::new(SimLed::default(), VirtualDelay(clock.clone())),
    };
    let mut power = SimPower::default();

    for cycle in 1..=options.cycles {
        if options.manual_wake == Some(cycle) {
            cause = WakeupCause::ExternalInterruptWake;
        }

        let report = embassy_futures::block_on(run_cycle(
            cause,
            &config,
            Some(&endpoint),
            &mut board,
            &mut power,
        ));

        info!(
            "Cycle #{} ({}): sampled {}, synced {}, {} fault(s)",
            report.state.boot_count,
            report.cause,
            report.sampling.map_or(0, |s| s.sampled),
            report.sync.as_ref().map_or(0, |s| s.delivered()),
            report.faults.len()
        );
        for fault in &report.faults {
            info!("  fault: {}", fault);
        }

        if cycle < options.cycles {
            clock.sleep(report.plan.timer.as_millis() as u64);
            cause = WakeupCause::TimerWake;
        }
    }

    power.deep_sleep()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Options::command().debug_assert();
    }

    #[test]
    fn defaults_run_six_timer_cycles() {
        let options = Options::try_parse_from(["canopy-simulator"]).unwrap();
        assert_eq!(options.cycles, 6);
        assert_eq!(options.collector_status, 201);
        assert_eq!(options.state_dir, PathBuf::from("sim-state"));
        assert!(!options.cold);
        assert!(!options.no_ntp);
        assert_eq!(options.manual_wake, None);
    }

    #[test]
    fn flags_override_defaults() {
        let options = Options::try_parse_from([
            "canopy-simulator",
            "--cycles",
            "3",
            "--no-ntp",
            "--manual-wake",
            "2",
            "--collector-status",
            "500",
            "--failing-sensor",
            "1",
        ])
        .unwrap();
        assert_eq!(options.cycles, 3);
        assert!(options.no_ntp);
        assert_eq!(options.manual_wake, Some(2));
        assert_eq!(options.collector_status, 500);
        assert_eq!(options.failing_sensor, Some(1));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(Options::try_parse_from(["canopy-simulator", "--cycles", "many"]).is_err());
    }
}

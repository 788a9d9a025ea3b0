//! Field control daemon entry point.
//!
//! Composes the PLC supervisor, the packet engine, and the WLED sessions
//! into a fixed-cadence service loop with signal handling.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use fcs_common::{DaemonConfig, MatchEvent, MatchPhase};
use fcs_field::{FieldEngine, UpdateSink};
use fcs_packets::FieldControlUpdatePacket;
use fcs_plc::{ModbusClient, ModbusTcp, PlcEvent, PlcSupervisor, SimulatedModbus};
use fcs_wled::{SimulatedTransport, TcpTransport, WledTransport};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::signals::SignalHandler;

/// Field control daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "fcs-daemon",
    about = "Field control daemon - PLC supervision and LED controller sessions",
    version,
    long_about = None
)]
struct Args {
    /// Path to a daemon configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// PLC address (overrides config file).
    #[arg(long, value_name = "ADDR")]
    plc_address: Option<String>,

    /// Run against simulated hardware (no PLC, no controllers).
    #[arg(long, short = 's')]
    simulated: bool,

    /// Maximum ticks to run (0 = infinite).
    #[arg(long, default_value = "0")]
    max_ticks: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting field control daemon");

    let mut config = load_config(&args)?;
    if let Some(addr) = &args.plc_address {
        config.plc_address = addr.clone();
    }

    info!(?config.tick_period, plc = %config.plc_address, "configuration loaded");

    let signal_handler = SignalHandler::new().context("failed to set up signal handlers")?;

    if args.simulated {
        info!("using simulated PLC and controller transports");
        run(
            &config,
            SimulatedModbus::new(),
            &SimulatedTransport::new(),
            &signal_handler,
            args.max_ticks,
        )
    } else {
        run(
            &config,
            ModbusTcp::new(),
            &TcpTransport,
            &signal_handler,
            args.max_ticks,
        )
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "fcs_daemon={level},fcs_field={level},fcs_wled={level},fcs_plc={level},fcs_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `FCS_CONFIG_PATH` environment variable
/// 3. `/etc/fcs/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<DaemonConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "loading config from command-line argument");
        return DaemonConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("FCS_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "loading config from FCS_CONFIG_PATH");
            return DaemonConfig::from_file(&config_path).with_context(|| {
                format!("failed to load config from FCS_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "FCS_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/fcs/config.toml");
    if system_path.exists() {
        info!(?system_path, "loading config from system path");
        return DaemonConfig::from_file(&system_path)
            .with_context(|| format!("failed to load config from {system_path:?}"));
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "loading config from local path");
        return DaemonConfig::from_file(&local_path)
            .with_context(|| format!("failed to load config from {local_path:?}"));
    }

    info!("no config file found, using built-in defaults");
    Ok(DaemonConfig::default())
}

/// Sink that publishes update packets to the log stream.
struct TracingSink;

impl UpdateSink for TracingSink {
    fn broadcast_update(&mut self, update: &FieldControlUpdatePacket) {
        match serde_json::to_string(update) {
            Ok(body) => debug!(%body, "field control update"),
            Err(e) => warn!(error = %e, "failed to serialize update"),
        }
    }
}

/// Main service loop.
fn run<C, T>(
    config: &DaemonConfig,
    client: C,
    transport: &T,
    signal_handler: &SignalHandler,
    max_ticks: u64,
) -> Result<()>
where
    C: ModbusClient,
    T: WledTransport + Clone,
{
    let mut plc = PlcSupervisor::new(client);
    plc.connect(&config.plc_address);

    let mut engine = FieldEngine::new(&config.field, transport, TracingSink);
    engine.start(Instant::now());

    let mut phase = MatchPhase::Prestart;
    let mut ticks = 0u64;

    info!("entering service loop");

    while !signal_handler.shutdown_requested() {
        let started = Instant::now();

        for event in plc.poll(phase, started) {
            match event {
                PlcEvent::InputsChanged(inputs) => {
                    info!(?inputs, "PLC inputs changed");
                }
                PlcEvent::MatchAbort => {
                    error!("field e-stop asserted, aborting match");
                    phase = MatchPhase::Aborted;
                    engine.on_match_event(MatchEvent::Aborted);
                }
            }
        }

        engine.service(started);

        ticks += 1;
        if max_ticks > 0 && ticks >= max_ticks {
            info!(ticks, "maximum tick count reached");
            break;
        }

        // Periodic status logging (every 600 ticks, one minute at the
        // default cadence).
        if ticks % 600 == 0 {
            info!(
                ticks,
                plc_healthy = plc.status().is_healthy,
                "periodic status"
            );
        }

        if let Some(remaining) = config.tick_period.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    info!(
        ticks,
        signals = signal_handler.state().signal_count(),
        "daemon shutdown complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["fcs-daemon", "--simulated"]);
        assert!(args.simulated);
        assert!(args.config.is_none());
        assert_eq!(args.max_ticks, 0);
    }

    #[test]
    fn test_args_with_config() {
        let args = Args::parse_from([
            "fcs-daemon",
            "-c",
            "test.toml",
            "--plc-address",
            "10.0.100.20",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("test.toml")));
        assert_eq!(args.plc_address, Some(String::from("10.0.100.20")));
    }

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.tick_period.as_millis(), 100);
        assert_eq!(config.plc_address, "10.0.100.10");
    }

    #[test]
    fn test_bounded_simulated_run() {
        let config = DaemonConfig {
            tick_period: std::time::Duration::from_millis(1),
            ..DaemonConfig::default()
        };
        let handler = SignalHandler::new().unwrap();
        run(
            &config,
            SimulatedModbus::new(),
            &SimulatedTransport::new(),
            &handler,
            5,
        )
        .unwrap();
    }
}

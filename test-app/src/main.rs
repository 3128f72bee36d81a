// px100-monitor -- command line front end for PX100 electronic loads.
//
// Usage:
//   px100-monitor list
//   px100-monitor --port /dev/ttyUSB0 monitor --duration 600
//   px100-monitor set set_current 1.5
//   px100-monitor set enable on
//   px100-monitor set set_timer 01:30:00
//   px100-monitor set reset
//   px100-monitor --mock monitor
//
// Logging goes to stderr and is controlled with RUST_LOG (e.g.
// RUST_LOG=px100_protocol=debug).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use px100::transport::list_ports;
use px100::{
    CommandKind, CommandReport, CommandRequest, DeviceSession, Discovery, MeasurementSnapshot,
    SerialDiscovery, SessionConfig, WorkerBuilder, WorkerEvent, WorkerStatus,
};
use px100_test_harness::SimulatedPx100;

/// Snapshot lines are printed at most this often unless the output toggles.
const PRINT_EVERY: Duration = Duration::from_secs(10);

/// PX100 monitor -- polls a PX100 load and sends it commands.
#[derive(Parser)]
#[command(name = "px100-monitor", version, about)]
struct Cli {
    /// Serial port to probe. Repeat to try several; by default every port
    /// the OS reports is probed.
    #[arg(long)]
    port: Vec<String>,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Give up after this many failed reconnection attempts.
    #[arg(long)]
    max_reconnects: Option<u32>,

    /// Talk to a simulated load instead of a serial port.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports.
    List,

    /// Poll the load and print measurements.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Send one command and report whether the load confirmed it.
    Set {
        /// enable, set_voltage, set_current, set_timer or reset.
        kind: CommandKind,

        /// on/off, a decimal, or HH:MM:SS. Not needed for reset.
        #[arg(default_value = "0")]
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Simulated load
// ---------------------------------------------------------------------------

/// Discovery that always finds the simulated load.
struct SimulatedDiscovery {
    device: SimulatedPx100,
}

#[async_trait]
impl Discovery for SimulatedDiscovery {
    async fn discover(&self) -> px100::Result<DeviceSession> {
        Ok(DeviceSession::new(
            Box::new(self.device.transport_on("sim")),
            SessionConfig::default(),
        ))
    }
}

fn simulated_discovery() -> SimulatedDiscovery {
    let device = SimulatedPx100::new();
    // One simulated minute per poll so a discharge finishes in a few minutes.
    device.set_seconds_per_poll(60.0);
    device.set_terminal_voltage(12.6);
    SimulatedDiscovery { device }
}

fn discovery(cli: &Cli) -> Arc<dyn Discovery> {
    if cli.mock {
        Arc::new(simulated_discovery())
    } else {
        Arc::new(SerialDiscovery::new().ports(cli.port.iter().cloned()))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    let ports = list_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    println!("{:<24}  {:<4}  Product", "Port", "USB");
    for port in ports {
        println!(
            "{:<24}  {:<4}  {}",
            port.name,
            if port.usb { "yes" } else { "no" },
            port.product.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn format_snapshot(s: &MeasurementSnapshot) -> String {
    format!(
        "{} {:<3} {:>7.3} V {:>6.3} A {:>7.3} W  {} {:>7.3} Ah {:>7.3} Wh  {:>3.0} C  set {:.2} A / {:.2} V / {}",
        s.captured_at.format("%H:%M:%S"),
        if s.is_on { "ON" } else { "off" },
        s.voltage,
        s.current,
        s.power(),
        s.time,
        s.cap_ah,
        s.cap_wh,
        s.temp,
        s.set_current,
        s.set_voltage,
        s.set_timer,
    )
}

fn format_report(r: &CommandReport) -> String {
    let outcome = if r.verified { "verified" } else { "NOT verified" };
    match r.observed {
        Some(observed) => format!(
            "{} {} {} after {} attempt(s), load reports {}",
            r.kind, r.requested, outcome, r.attempts, observed
        ),
        None => format!(
            "{} {} {} after {} attempt(s)",
            r.kind, r.requested, outcome, r.attempts
        ),
    }
}

async fn cmd_monitor(cli: &Cli, duration_secs: u64) -> Result<()> {
    let (worker, mut events) = builder(cli).start_running(true).spawn_shared(discovery(cli))?;

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    let mut last_print: Option<(Instant, bool)> = None;

    loop {
        let remaining = match deadline {
            Some(dl) => dl.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        if remaining.is_zero() {
            println!("Monitor duration elapsed.");
            break;
        }

        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            r = tokio::time::timeout(remaining, events.recv()) => r,
        };

        match event {
            Ok(Ok(WorkerEvent::Snapshot(s))) => {
                let due = match last_print {
                    None => true,
                    Some((at, was_on)) => at.elapsed() >= PRINT_EVERY || was_on != s.is_on,
                };
                if due {
                    println!("{}", format_snapshot(&s));
                    last_print = Some((Instant::now(), s.is_on));
                }
            }
            Ok(Ok(WorkerEvent::CommandCompleted(r))) => println!("[command] {}", format_report(&r)),
            Ok(Ok(WorkerEvent::Status(status))) => {
                println!("[status] {status}");
                if matches!(status, WorkerStatus::NoDevice | WorkerStatus::GaveUp { .. }) {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(n))) => println!("[warning] missed {n} events"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }

    worker.shutdown().await?;
    Ok(())
}

async fn cmd_set(cli: &Cli, kind: CommandKind, value: &str) -> Result<()> {
    let request = CommandRequest::parse(kind, value)?;
    tracing::debug!(command = %request.kind, value = %request.value, mock = cli.mock, "sending");
    let (worker, mut events) = builder(cli).spawn_shared(discovery(cli))?;
    worker.enqueue_command(request)?;

    let report = loop {
        match events.recv().await {
            Ok(WorkerEvent::CommandCompleted(r)) => break r,
            Ok(WorkerEvent::Status(WorkerStatus::Connected { name, port })) => {
                println!("Connected to {name} on {port}");
            }
            Ok(WorkerEvent::Status(WorkerStatus::NoDevice)) => bail!("no PX100 found"),
            Ok(WorkerEvent::Status(status)) => println!("[status] {status}"),
            Ok(WorkerEvent::Snapshot(_)) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("worker stopped before the command ran"),
        }
    };
    println!("{}", format_report(&report));

    // Closing the worker switches the output off again.
    worker.shutdown().await?;
    report.into_result()?;
    Ok(())
}

fn builder(cli: &Cli) -> WorkerBuilder {
    let mut builder = WorkerBuilder::new().poll_interval(Duration::from_millis(cli.interval_ms));
    if let Some(n) = cli.max_reconnects {
        builder = builder.max_reconnect_attempts(n);
    }
    builder
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::List => cmd_list(),
        Command::Monitor { duration } => cmd_monitor(&cli, *duration).await,
        Command::Set { kind, value } => cmd_set(&cli, *kind, value).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px100::Hms;

    #[test]
    fn cli_parses_set() {
        let cli = Cli::try_parse_from([
            "px100-monitor",
            "--port",
            "/dev/ttyUSB0",
            "--port",
            "/dev/ttyUSB1",
            "set",
            "set_current",
            "1.5",
        ])
        .unwrap();
        assert_eq!(cli.port, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        match cli.command {
            Command::Set { kind, value } => {
                assert_eq!(kind, CommandKind::SetCurrent);
                assert_eq!(value, "1.5");
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn cli_rejects_unknown_command_kind() {
        assert!(Cli::try_parse_from(["px100-monitor", "set", "frequency", "1"]).is_err());
    }

    #[test]
    fn report_line_mentions_outcome() {
        let report = CommandReport {
            kind: CommandKind::SetCurrent,
            requested: px100::Value::Decimal(2.0),
            attempts: 3,
            verified: false,
            observed: Some(px100::Value::Decimal(1.5)),
            refreshed: Vec::new(),
        };
        let line = format_report(&report);
        assert!(line.contains("NOT verified after 3 attempt(s)"), "{line}");
        assert!(line.contains("load reports 1.5"), "{line}");
    }

    #[test]
    fn snapshot_line_has_timer() {
        let s = MeasurementSnapshot {
            time: Hms::new(27, 4, 9).unwrap(),
            set_timer: Hms::new(1, 30, 0).unwrap(),
            ..Default::default()
        };
        let line = format_snapshot(&s);
        assert!(line.ends_with("01:30:00"), "{line}");
        assert!(line.contains("27:04:09"), "{line}");
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let cli = Cli::try_parse_from(["px100-monitor", "--mock", "--interval-ms", "0", "monitor"])
            .unwrap();
        assert!(builder(&cli).spawn_shared(discovery(&cli)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn set_against_simulated_load() {
        let cli = Cli::try_parse_from(["px100-monitor", "--mock", "set", "set_voltage", "3.2"])
            .unwrap();
        cmd_set(&cli, CommandKind::SetVoltage, "3.2").await.unwrap();
    }
}

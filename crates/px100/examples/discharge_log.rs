//! Discharge a battery and log its capacity.
//!
//! Finds the load on any serial port, sets a discharge current and cut-off
//! voltage, switches the output on, and prints a line per snapshot until
//! the load switches itself off at the cut-off.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=px100=debug cargo run -p px100 --example discharge_log
//! ```

use px100::{CommandRequest, SerialDiscovery, WorkerBuilder, WorkerEvent, WorkerStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (worker, mut events) = WorkerBuilder::new()
        .start_running(true)
        .spawn(SerialDiscovery::new())?;

    worker.enqueue_command(CommandRequest::set_current(1.0)?)?;
    worker.enqueue_command(CommandRequest::set_voltage(3.0)?)?;
    worker.enqueue_command(CommandRequest::reset())?;
    worker.enqueue_command(CommandRequest::enable(true))?;

    let mut was_on = false;
    while let Ok(event) = events.recv().await {
        match event {
            WorkerEvent::Status(WorkerStatus::NoDevice) => anyhow::bail!("no PX100 found"),
            WorkerEvent::Status(status) => println!("{status}"),
            WorkerEvent::CommandCompleted(report) => {
                let report = report.into_result()?;
                println!("{} = {} ({} attempt(s))", report.kind, report.requested, report.attempts);
            }
            WorkerEvent::Snapshot(s) => {
                println!(
                    "{} {:>7.3} V {:>6.3} A {:>7.3} Ah {:>7.3} Wh",
                    s.time,
                    s.voltage,
                    s.current,
                    s.cap_ah,
                    s.cap_wh
                );
                if was_on && !s.is_on {
                    println!("cut-off reached: {:.3} Ah", s.cap_ah);
                    break;
                }
                was_on |= s.is_on;
            }
        }
    }

    worker.shutdown().await?;
    Ok(())
}

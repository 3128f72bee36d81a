//! # px100 -- control and measurement streaming for PX100 electronic loads
//!
//! `px100` talks to a PX100 DC electronic load (the 6-byte binary protocol
//! spoken over its USB virtual COM port at 9600 baud). A background worker
//! owns the serial link, polls measurements, executes setpoint commands
//! with write-then-verify retries, and reconnects on its own when the
//! instrument stops answering.
//!
//! ## Quick Start
//!
//! ```no_run
//! use px100::{CommandRequest, SerialDiscovery, WorkerBuilder, WorkerEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (worker, mut events) = WorkerBuilder::new()
//!         .start_running(true)
//!         .spawn(SerialDiscovery::new())?;
//!
//!     worker.enqueue_command(CommandRequest::set_current(1.5)?)?;
//!     worker.enqueue_command(CommandRequest::enable(true))?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let WorkerEvent::Snapshot(s) = event {
//!             println!("{:.3} V {:.3} A {:.3} Ah", s.voltage, s.current, s.cap_ah);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                            |
//! |---------------------|----------------------------------------------------|
//! | `px100-core`        | Registers, values, snapshots, events, errors, [`Transport`] |
//! | `px100-transport`   | Serial transport and port listing                  |
//! | `px100-protocol`    | Frame/value codecs, session, discovery, worker     |
//! | **`px100`**         | This facade crate -- re-exports everything         |
//!
//! ## Events
//!
//! The worker publishes [`WorkerEvent`]s on a broadcast channel:
//! measurement snapshots, command reports (including whether the
//! instrument confirmed the new setpoint), and [`WorkerStatus`] changes
//! such as `Connected`, `ConnectionLost` and `Reconnected`.

pub use px100_core::*;

pub use px100_protocol::{
    DeviceSession, Discovery, PollingWorker, SerialDiscovery, SessionConfig, WorkerBuilder,
    DEVICE_NAME,
};

/// Wire-level codecs, for tools that speak the protocol directly.
pub mod protocol {
    pub use px100_protocol::frame;
    pub use px100_protocol::value;
}

/// Serial transport and port enumeration.
pub mod transport {
    pub use px100_transport::*;
}

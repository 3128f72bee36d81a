//! Events emitted by the polling worker.
//!
//! Events are delivered through a `tokio::sync::broadcast` channel. Slow
//! consumers may lag and miss events; every snapshot is self-contained, so a
//! missed one only costs a sample.

use std::fmt;

use crate::error::{Error, Result};
use crate::snapshot::MeasurementSnapshot;
use crate::types::{CommandKind, RegisterAddress, Value};

/// Connectivity narration from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// A session was opened at startup.
    Connected {
        /// Instrument name.
        name: String,
        /// Serial endpoint the instrument answered on.
        port: String,
    },
    /// Startup discovery found nothing. The worker stops.
    NoDevice,
    /// Too many consecutive failed polls; the session is being replaced.
    ConnectionLost {
        /// Consecutive failures that triggered the reconnect.
        failures: u32,
    },
    /// A replacement session is up and polling resumes.
    Reconnected {
        /// Serial endpoint of the new session.
        port: String,
    },
    /// A reconnection attempt found no instrument.
    ReconnectFailed {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// The reconnection attempt limit was reached. The worker stops.
    GaveUp {
        /// Number of failed attempts.
        attempts: u32,
    },
    /// The worker closed its session and exited.
    Disconnected,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Connected { name, port } => write!(f, "Connected to {name} on {port}"),
            WorkerStatus::NoDevice => write!(f, "No devices found"),
            WorkerStatus::ConnectionLost { failures } => {
                write!(f, "Connection lost after {failures} failed reads")
            }
            WorkerStatus::Reconnected { .. } => write!(f, "Reconnected to device"),
            WorkerStatus::ReconnectFailed { .. } => write!(f, "Reconnection failed"),
            WorkerStatus::GaveUp { attempts } => {
                write!(f, "Giving up after {attempts} reconnection attempts")
            }
            WorkerStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Outcome of one verify-and-retry command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    /// The command that ran.
    pub kind: CommandKind,
    /// The value that was requested.
    pub requested: Value,
    /// Write/read-back cycles performed.
    pub attempts: u32,
    /// `true` if the read-back matched the requested value.
    pub verified: bool,
    /// Last value read from the verification register, if any read worked.
    pub observed: Option<Value>,
    /// Registers re-read after the command (the auxiliary group after a reset).
    pub refreshed: Vec<(RegisterAddress, Value)>,
}

impl CommandReport {
    /// Turn an unverified report into [`Error::Verification`].
    pub fn into_result(self) -> Result<Self> {
        if self.verified {
            Ok(self)
        } else {
            Err(Error::Verification {
                command: self.kind,
                attempts: self.attempts,
            })
        }
    }
}

/// An event emitted by the polling worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A complete poll cycle.
    Snapshot(MeasurementSnapshot),
    /// Connectivity change.
    Status(WorkerStatus),
    /// A queued command finished executing.
    CommandCompleted(CommandReport),
}

//! px100-core: Core traits, types, and error definitions for px100.
//!
//! This crate holds everything that is shared between the transport, the
//! protocol engine, and applications consuming the measurement stream,
//! without pulling in serial port support.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`RegisterAddress`] / [`CommandKind`] -- fixed register and command tables
//! - [`MeasurementSnapshot`] -- one poll's decoded values
//! - [`WorkerEvent`] / [`WorkerStatus`] -- the worker's outbound stream
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod snapshot;
pub mod transport;
pub mod types;

pub use error::{Error, FailureKind, Result};
pub use events::{CommandReport, WorkerEvent, WorkerStatus};
pub use snapshot::MeasurementSnapshot;
pub use transport::Transport;
pub use types::*;

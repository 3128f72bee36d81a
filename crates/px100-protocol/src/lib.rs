//! px100-protocol: the PX100 wire protocol and the polling worker.
//!
//! - [`frame`]: 6-byte requests, 7-byte read responses, 1-byte write ACKs.
//! - [`value`]: payload scaling, time-of-day registers, write encodings.
//! - [`session`]: [`DeviceSession`], register I/O and verify-and-retry
//!   commands over any [`Transport`](px100_core::Transport).
//! - [`discovery`]: the [`Discovery`] seam and [`SerialDiscovery`].
//! - [`worker`] / [`builder`]: the background [`PollingWorker`] that
//!   owns the session, and its [`WorkerBuilder`].

pub mod builder;
pub mod discovery;
pub mod frame;
pub mod session;
pub mod value;
pub mod worker;

pub use builder::WorkerBuilder;
pub use discovery::{Discovery, SerialDiscovery};
pub use session::{DeviceSession, SessionConfig, DEVICE_NAME};
pub use worker::PollingWorker;

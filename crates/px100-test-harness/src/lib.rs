//! px100-test-harness: mock transports for testing px100 without hardware.
//!
//! [`MockTransport`] stands in for the serial link in session and worker
//! tests; [`SentLog`] lets a test inspect the frames a session sent after
//! the transport has been moved into it. [`SimulatedPx100`] answers frames
//! like a real instrument, for tests and demos that run for many cycles.

pub mod mock_serial;
pub mod sim_device;

pub use mock_serial::{MockTransport, SentLog};
pub use sim_device::SimulatedPx100;

//! Transport implementations for px100.
//!
//! This crate provides [`SerialTransport`], the concrete
//! [`Transport`](px100_core::Transport) used to reach the load over its USB
//! virtual COM port, and [`list_ports`] for finding candidate ports.
//!
//! # Example
//!
//! ```no_run
//! use px100_transport::{list_ports, SerialTransport};
//!
//! # async fn example() -> px100_core::Result<()> {
//! for port in list_ports()? {
//!     println!("{} (usb: {})", port.name, port.usb);
//! }
//! let transport = SerialTransport::open("/dev/ttyUSB0", 9600).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{
    list_ports, DataBits, FlowControl, Parity, PortInfo, SerialConfig, SerialTransport, StopBits,
};

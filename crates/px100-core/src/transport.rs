//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the load.
//! The protocol engine in `px100-protocol` only ever talks to a
//! `Box<dyn Transport>`, so the same session code drives a real serial port
//! (`px100-transport`) or a `MockTransport` from `px100-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level link to an instrument.
///
/// Implementations only move bytes. Framing, response lengths and
/// acknowledgement checks belong to the protocol engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the instrument.
    ///
    /// Returns once all bytes have been handed to the underlying port.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the instrument into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be fewer than
    /// `buf.len()`. Waits up to `timeout` for data to arrive and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard any bytes already waiting in the receive buffer.
    async fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the transport connection.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Human-readable endpoint name (port path) for logging and status.
    fn endpoint(&self) -> &str;
}

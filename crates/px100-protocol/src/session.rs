//! DeviceSession -- register reads/writes and the verify-and-retry command
//! protocol on top of a [`Transport`].
//!
//! A session owns its transport exclusively and has no internal
//! concurrency; the polling worker is the only caller once it is running.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use px100_core::transport::Transport;
use px100_core::{
    CommandKind, CommandReport, Error, RegisterAddress, Result, Value, AUX_GROUP,
};

use crate::frame::{self, READ_RESPONSE_LEN};
use crate::value::{decode_payload, encode_value, values_match};

/// Name the instrument is reported under.
pub const DEVICE_NAME: &str = "PX100";

/// Timing and retry parameters of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for a complete response to one request.
    pub response_timeout: Duration,
    /// Pause between a command write and its verification read.
    pub settle_delay: Duration,
    /// Pause after a failed verification before writing again.
    pub retry_delay: Duration,
    /// Write/verify cycles before a command is given up on.
    pub max_attempts: u32,
    /// Pause between switching the output off and releasing the port.
    pub close_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            response_timeout: Duration::from_millis(2000),
            settle_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(700),
            max_attempts: 3,
            close_delay: Duration::from_millis(200),
        }
    }
}

/// A protocol session with one instrument.
pub struct DeviceSession {
    transport: Box<dyn Transport>,
    config: SessionConfig,
}

impl DeviceSession {
    /// Wrap an open transport.
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        DeviceSession { transport, config }
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        DEVICE_NAME
    }

    /// Endpoint (port path) of the underlying transport.
    pub fn port(&self) -> &str {
        self.transport.endpoint()
    }

    /// Session timing parameters.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send one request and collect up to the expected number of response
    /// bytes. An empty vector means the instrument stayed silent.
    async fn exchange(&mut self, code: u8, payload: [u8; 2]) -> Result<Vec<u8>> {
        let request = frame::encode_frame(code, payload);
        self.transport.send(&request).await?;

        let want = frame::expected_response_len(code);
        let mut response = Vec::with_capacity(want);
        let mut buf = [0u8; READ_RESPONSE_LEN];
        let deadline = Instant::now() + self.config.response_timeout;

        while response.len() < want {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let need = want - response.len();
            match self.transport.receive(&mut buf[..need], remaining).await {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }

        trace!(
            code = format_args!("0x{code:02X}"),
            request = ?request,
            response = ?response,
            "exchange"
        );
        Ok(response)
    }

    /// Read and decode one register.
    ///
    /// Fails with [`Error::NoAnswer`] when the instrument is silent and
    /// [`Error::Frame`] when the response is malformed.
    pub async fn read_register(&mut self, register: RegisterAddress) -> Result<Value> {
        let response = self.exchange(register.code(), [0, 0]).await?;
        let payload = frame::decode_read_response(&response).map_err(|e| {
            debug!(register = %register, error = %e, "register read failed");
            e
        })?;
        decode_payload(register, payload)
    }

    /// Read several registers, keeping the ones that answered.
    ///
    /// Only a link failure aborts the group.
    pub async fn read_group(
        &mut self,
        registers: &[RegisterAddress],
    ) -> Result<Vec<(RegisterAddress, Value)>> {
        let mut values = Vec::with_capacity(registers.len());
        for &register in registers {
            match self.read_register(register).await {
                Ok(value) => values.push((register, value)),
                Err(e) if e.is_link_failure() => return Err(e),
                Err(_) => {}
            }
        }
        Ok(values)
    }

    /// Write `value` to the register targeted by `kind`.
    ///
    /// Succeeds only if the instrument answers with the `0x6F` ACK.
    pub async fn write_register(&mut self, kind: CommandKind, value: Value) -> Result<()> {
        let payload = encode_value(kind, value)?;
        let response = self.exchange(kind.target_code(), payload).await?;
        frame::decode_write_ack(&response)
    }

    /// Run a command with the verify-and-retry protocol.
    ///
    /// Each attempt writes the value, waits `settle_delay`, and reads the
    /// command's verification register. A matching read ends the command;
    /// otherwise it waits `retry_delay` and tries again, up to
    /// `max_attempts` times. Running out of attempts is not an error: the
    /// returned report has `verified == false`. Only link failures and
    /// values that cannot be encoded are returned as `Err`.
    ///
    /// A reset re-reads the auxiliary registers afterwards, whatever the
    /// verification outcome.
    pub async fn execute_command(
        &mut self,
        kind: CommandKind,
        value: Value,
    ) -> Result<CommandReport> {
        // Reject unencodable values before touching the wire.
        encode_value(kind, value)?;

        let register = kind.verify_register();
        let max_attempts = self.config.max_attempts.max(1);
        let mut observed = None;
        let mut verified = false;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;

            match self.write_register(kind, value).await {
                Ok(()) => {}
                Err(e) if e.is_link_failure() => return Err(e),
                Err(e) => {
                    warn!(command = %kind, attempt, error = %e, "command write not acknowledged");
                }
            }

            tokio::time::sleep(self.config.settle_delay).await;

            match self.read_register(register).await {
                Ok(v) => {
                    observed = Some(v);
                    if values_match(register, value, v) {
                        verified = true;
                        break;
                    }
                }
                Err(e) if e.is_link_failure() => return Err(e),
                Err(_) => {}
            }

            debug!(
                command = %kind,
                attempt,
                requested = %value,
                observed = ?observed,
                "retry"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        if verified {
            debug!(command = %kind, value = %value, attempts, "command verified");
        } else {
            warn!(
                command = %kind,
                requested = %value,
                observed = ?observed,
                attempts,
                "command not verified"
            );
        }

        let refreshed = if kind == CommandKind::Reset {
            self.read_group(&AUX_GROUP).await?
        } else {
            Vec::new()
        };

        Ok(CommandReport {
            kind,
            requested: value,
            attempts,
            verified,
            observed,
            refreshed,
        })
    }

    /// Check that a PX100 is on the other end.
    ///
    /// Drops stale input, then requires the voltage register to answer.
    pub async fn probe(&mut self) -> Result<()> {
        if let Err(e) = self.transport.clear_input().await {
            debug!(port = %self.port(), error = %e, "could not clear input before probe");
        }
        self.read_register(RegisterAddress::Voltage)
            .await
            .map(|_| ())
    }

    /// Switch the load's output off.
    pub async fn disable_output(&mut self) -> Result<()> {
        self.write_register(CommandKind::Enable, Value::Bool(false))
            .await
    }

    /// Switch the output off, then release the link.
    ///
    /// A failure to switch the output off is logged, not returned.
    pub async fn close(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            if let Err(e) = self.disable_output().await {
                warn!(port = %self.port(), error = %e, "failed to disable output on close");
            }
            tokio::time::sleep(self.config.close_delay).await;
        }
        self.release().await
    }

    /// Release the link without touching the instrument's state.
    pub async fn release(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Give up the session and recover the transport.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }
}

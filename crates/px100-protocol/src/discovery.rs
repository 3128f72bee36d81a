//! Finding the instrument.
//!
//! [`Discovery`] is the seam the polling worker uses both at startup and
//! when it reconnects. [`SerialDiscovery`] walks serial ports and keeps the
//! first one where a PX100 answers the probe.

use async_trait::async_trait;
use tracing::{debug, info};

use px100_core::{Error, Result};
use px100_transport::{list_ports, SerialConfig, SerialTransport};

use crate::session::{DeviceSession, SessionConfig};

/// Produces a connected, probed [`DeviceSession`].
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Locate an instrument and open a session to it.
    ///
    /// Returns [`Error::Discovery`] when nothing answers.
    async fn discover(&self) -> Result<DeviceSession>;
}

/// Probe serial ports one after another.
///
/// # Example
///
/// ```no_run
/// use px100_protocol::discovery::{Discovery, SerialDiscovery};
///
/// # async fn example() -> px100_core::Result<()> {
/// let session = SerialDiscovery::new().port("/dev/ttyUSB0").discover().await?;
/// println!("found {} on {}", session.name(), session.port());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SerialDiscovery {
    ports: Vec<String>,
    serial: SerialConfig,
    session: SessionConfig,
}

impl SerialDiscovery {
    /// Probe every port the OS reports, with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict discovery to `port`. May be called repeatedly; ports are
    /// probed in the order given.
    pub fn port(mut self, port: &str) -> Self {
        self.ports.push(port.to_string());
        self
    }

    /// Restrict discovery to `ports`.
    pub fn ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports.extend(ports.into_iter().map(Into::into));
        self
    }

    /// Serial link settings used to open each candidate.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial = config;
        self
    }

    /// Session settings handed to the session that is found.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    fn candidates(&self) -> Result<Vec<String>> {
        if !self.ports.is_empty() {
            return Ok(self.ports.clone());
        }
        Ok(list_ports()?.into_iter().map(|p| p.name).collect())
    }
}

#[async_trait]
impl Discovery for SerialDiscovery {
    async fn discover(&self) -> Result<DeviceSession> {
        let candidates = self.candidates()?;
        if candidates.is_empty() {
            return Err(Error::Discovery("no serial ports found".into()));
        }

        for port in &candidates {
            let opened = SerialTransport::open_with_config(port, self.serial.clone()).await;
            let transport = match opened {
                Ok(t) => t,
                Err(e) => {
                    debug!(port = %port, error = %e, "skipping port");
                    continue;
                }
            };

            let mut session = DeviceSession::new(Box::new(transport), self.session.clone());
            match session.probe().await {
                Ok(()) => {
                    info!(port = %port, "found {}", session.name());
                    return Ok(session);
                }
                Err(e) => {
                    debug!(port = %port, error = %e, "probe failed");
                    if let Err(e) = session.release().await {
                        debug!(port = %port, error = %e, "close after failed probe");
                    }
                }
            }
        }

        Err(Error::Discovery(format!(
            "no PX100 answered on {} port(s)",
            candidates.len()
        )))
    }
}

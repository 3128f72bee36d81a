//! WorkerBuilder -- fluent configuration for [`PollingWorker`].
//!
//! # Example
//!
//! ```no_run
//! use px100_protocol::builder::WorkerBuilder;
//! use px100_protocol::discovery::SerialDiscovery;
//! use std::time::Duration;
//!
//! # async fn example() -> px100_core::Result<()> {
//! let (worker, mut events) = WorkerBuilder::new()
//!     .poll_interval(Duration::from_millis(500))
//!     .max_reconnect_attempts(20)
//!     .start_running(true)
//!     .spawn(SerialDiscovery::new().port("/dev/ttyUSB0"))?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # worker.shutdown().await
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use px100_core::{Error, Result, WorkerEvent};

use crate::discovery::Discovery;
use crate::worker::{spawn_worker, PollingWorker, WorkerConfig};

/// Fluent builder for [`PollingWorker`].
#[derive(Debug, Clone)]
pub struct WorkerBuilder {
    poll_interval: Duration,
    failure_threshold: u32,
    aux_every: u64,
    reconnect_delay: Duration,
    max_reconnect_attempts: Option<u32>,
    event_capacity: usize,
    start_running: bool,
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerBuilder {
    /// Builder with the instrument's usual cadence.
    pub fn new() -> Self {
        WorkerBuilder {
            poll_interval: Duration::from_millis(500),
            failure_threshold: 10,
            aux_every: 5,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: None,
            event_capacity: 64,
            start_running: false,
        }
    }

    /// Pause between loop iterations (default: 500ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consecutive failures that count as a lost connection (default: 10).
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Read the auxiliary group on every `n`th successful poll (default: 5).
    pub fn aux_every(mut self, n: u64) -> Self {
        self.aux_every = n;
        self
    }

    /// Wait before each rediscovery attempt (default: 1s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Stop the worker after `n` failed rediscoveries in a row.
    /// Unlimited by default.
    pub fn max_reconnect_attempts(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = Some(n);
        self
    }

    /// Broadcast buffer size. Slow subscribers lag past this many events.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Whether polling is enabled as soon as the device is found
    /// (default: false, commands only until [`PollingWorker::start`]).
    pub fn start_running(mut self, running: bool) -> Self {
        self.start_running = running;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "poll_interval must be greater than zero".into(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(Error::InvalidParameter(
                "failure_threshold must be at least 1".into(),
            ));
        }
        if self.aux_every == 0 {
            return Err(Error::InvalidParameter("aux_every must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be at least 1".into(),
            ));
        }
        if self.max_reconnect_attempts == Some(0) {
            return Err(Error::InvalidParameter(
                "max_reconnect_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Spawn the worker. It discovers the device, reports `Connected` or
    /// `NoDevice`, and then runs until asked to exit.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<D>(self, discovery: D) -> Result<(PollingWorker, broadcast::Receiver<WorkerEvent>)>
    where
        D: Discovery + 'static,
    {
        self.spawn_shared(Arc::new(discovery))
    }

    /// Like [`spawn`](Self::spawn), for a discovery shared with the caller.
    pub fn spawn_shared(
        self,
        discovery: Arc<dyn Discovery>,
    ) -> Result<(PollingWorker, broadcast::Receiver<WorkerEvent>)> {
        self.validate()?;

        let (event_tx, event_rx) = broadcast::channel(self.event_capacity);
        let config = WorkerConfig {
            poll_interval: self.poll_interval,
            failure_threshold: self.failure_threshold,
            aux_every: self.aux_every,
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
        };
        let worker = spawn_worker(discovery, config, self.start_running, event_tx);
        Ok((worker, event_rx))
    }
}

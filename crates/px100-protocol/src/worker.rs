//! PollingWorker -- the background task that owns the device session.
//!
//! One spawned task holds the [`DeviceSession`] exclusively. Each
//! iteration it executes at most one queued command, then (while running)
//! polls the frequent register group and every few cycles the auxiliary
//! group. Results and status changes go out on a broadcast channel.
//!
//! Repeated poll failures close the session and trigger rediscovery
//! through the same [`Discovery`] used at startup. Commands queued while
//! the link is down wait for the next session.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use px100_core::{
    CommandKind, CommandRequest, Error, MeasurementSnapshot, Result, Value, WorkerEvent,
    WorkerStatus, AUX_GROUP, FREQUENT_GROUP,
};

use crate::discovery::Discovery;
use crate::session::DeviceSession;

/// Loop parameters, filled in by [`WorkerBuilder`](crate::builder::WorkerBuilder).
#[derive(Debug, Clone)]
pub(crate) struct WorkerConfig {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub aux_every: u64,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: Option<u32>,
}

/// Handle to a running polling worker.
///
/// Dropping the handle asks the worker to exit; it still switches the
/// output off and closes the port on its way out.
pub struct PollingWorker {
    cmd_tx: mpsc::UnboundedSender<CommandRequest>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<WorkerEvent>,
    task: Option<JoinHandle<()>>,
}

impl PollingWorker {
    /// Queue a validated command. Returns immediately.
    ///
    /// Fails with [`Error::NotConnected`] once the worker has exited.
    pub fn enqueue_command(&self, request: CommandRequest) -> Result<()> {
        debug!(command = %request.kind, value = %request.value, "queueing command");
        self.cmd_tx
            .send(request)
            .map_err(|_| Error::NotConnected)
    }

    /// Validate `value` for `kind` and queue it.
    pub fn enqueue(&self, kind: CommandKind, value: Value) -> Result<()> {
        self.enqueue_command(CommandRequest::new(kind, value)?)
    }

    /// Resume polling.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Pause polling. Queued commands are still executed.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether polling is enabled.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the worker to exit at the end of its current iteration.
    pub fn request_exit(&self) {
        self.cancel.cancel();
    }

    /// A new receiver for worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the worker task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the worker task to end.
    pub async fn join(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::Protocol(format!("worker task failed: {e}"))),
            None => Ok(()),
        }
    }

    /// Request exit and wait for the worker to close its session.
    pub async fn shutdown(self) -> Result<()> {
        self.request_exit();
        self.join().await
    }
}

impl Drop for PollingWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the worker task. Must be called inside a Tokio runtime.
pub(crate) fn spawn_worker(
    discovery: Arc<dyn Discovery>,
    config: WorkerConfig,
    start_running: bool,
    event_tx: broadcast::Sender<WorkerEvent>,
) -> PollingWorker {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let running = Arc::new(AtomicBool::new(start_running));
    let cancel = CancellationToken::new();

    let worker = Worker {
        discovery,
        config,
        events: event_tx.clone(),
        commands: cmd_rx,
        running: Arc::clone(&running),
        cancel: cancel.clone(),
        session: None,
        state: MeasurementSnapshot::default(),
        poll_count: 0,
        failures: 0,
        reconnect_attempts: 0,
    };
    let task = tokio::spawn(worker.run());

    PollingWorker {
        cmd_tx,
        running,
        cancel,
        event_tx,
        task: Some(task),
    }
}

struct Worker {
    discovery: Arc<dyn Discovery>,
    config: WorkerConfig,
    events: broadcast::Sender<WorkerEvent>,
    commands: mpsc::UnboundedReceiver<CommandRequest>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    session: Option<DeviceSession>,
    /// Latest known value of every register.
    state: MeasurementSnapshot,
    /// Successful frequent-group polls on the current session.
    poll_count: u64,
    /// Consecutive failed iterations.
    failures: u32,
    reconnect_attempts: u32,
}

impl Worker {
    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn status(&self, status: WorkerStatus) {
        info!("{status}");
        self.emit(WorkerEvent::Status(status));
    }

    async fn run(mut self) {
        match self.discovery.discover().await {
            Ok(session) => {
                self.status(WorkerStatus::Connected {
                    name: session.name().to_string(),
                    port: session.port().to_string(),
                });
                self.session = Some(session);
            }
            Err(e) => {
                warn!(error = %e, "discovery failed");
                self.status(WorkerStatus::NoDevice);
                return;
            }
        }

        while !self.cancel.is_cancelled() {
            if self.iterate().await.is_break() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "error closing session");
            }
            self.status(WorkerStatus::Disconnected);
        }
        debug!("worker exited");
    }

    async fn iterate(&mut self) -> ControlFlow<()> {
        if self.session.is_none() {
            return self.reconnect().await;
        }

        if let Ok(request) = self.commands.try_recv() {
            self.run_command(request).await;
        }

        if self.running.load(Ordering::SeqCst) {
            match self.poll().await {
                Ok(snapshot) => {
                    self.failures = 0;
                    self.emit(WorkerEvent::Snapshot(snapshot));
                }
                Err(e) => self.record_failure("poll", &e),
            }
        }

        if self.failures >= self.config.failure_threshold {
            self.status(WorkerStatus::ConnectionLost {
                failures: self.failures,
            });
            if let Some(mut session) = self.session.take() {
                if let Err(e) = session.close().await {
                    debug!(error = %e, "error closing lost session");
                }
            }
            return self.reconnect().await;
        }

        ControlFlow::Continue(())
    }

    fn record_failure(&mut self, what: &str, error: &Error) {
        self.failures += 1;
        // Log the first failure of every five at warn level.
        if self.failures % 5 == 1 {
            warn!(failures = self.failures, error = %error, "{what} failed");
        } else {
            debug!(failures = self.failures, error = %error, "{what} failed");
        }
    }

    async fn run_command(&mut self, request: CommandRequest) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        debug!(command = %request.kind, value = %request.value, "executing command");

        match session.execute_command(request.kind, request.value).await {
            Ok(report) => {
                let observed = report
                    .observed
                    .map(|v| (report.kind.verify_register(), v));
                for (register, value) in observed.iter().chain(report.refreshed.iter()) {
                    if let Err(e) = self.state.update(*register, *value) {
                        debug!(register = %register, error = %e, "ignoring value");
                    }
                }
                self.emit(WorkerEvent::CommandCompleted(report));
            }
            Err(e) => {
                warn!(command = %request.kind, error = %e, "command failed");
                if e.is_link_failure() {
                    self.record_failure("command", &e);
                }
            }
        }
    }

    async fn poll(&mut self) -> Result<MeasurementSnapshot> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        let mut next = self.state.clone();

        for register in FREQUENT_GROUP {
            let value = session.read_register(register).await?;
            next.update(register, value)?;
        }

        self.poll_count += 1;
        if self.poll_count % self.config.aux_every == 0 {
            for register in AUX_GROUP {
                match session.read_register(register).await {
                    Ok(value) => next.update(register, value)?,
                    Err(e) if e.is_link_failure() => return Err(e),
                    Err(e) => {
                        debug!(register = %register, error = %e, "auxiliary read failed, keeping previous value");
                    }
                }
            }
        }

        next.captured_at = Utc::now();
        self.state = next;
        Ok(self.state.clone())
    }

    async fn reconnect(&mut self) -> ControlFlow<()> {
        tokio::time::sleep(self.config.reconnect_delay).await;
        self.reconnect_attempts += 1;

        match self.discovery.discover().await {
            Ok(session) => {
                let port = session.port().to_string();
                self.session = Some(session);
                self.failures = 0;
                self.poll_count = 0;
                self.reconnect_attempts = 0;
                self.status(WorkerStatus::Reconnected { port });
                ControlFlow::Continue(())
            }
            Err(e) => {
                debug!(error = %e, attempt = self.reconnect_attempts, "rediscovery failed");
                self.status(WorkerStatus::ReconnectFailed {
                    attempt: self.reconnect_attempts,
                });
                match self.config.max_reconnect_attempts {
                    Some(max) if self.reconnect_attempts >= max => {
                        self.status(WorkerStatus::GaveUp {
                            attempts: self.reconnect_attempts,
                        });
                        ControlFlow::Break(())
                    }
                    _ => ControlFlow::Continue(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use px100_core::Hms;
    use px100_test_harness::{MockTransport, SentLog, SimulatedPx100};

    use super::*;
    use crate::builder::WorkerBuilder;
    use crate::session::SessionConfig;

    /// Hands out pre-built transports in order; `None` (or running out)
    /// is a failed discovery.
    struct ScriptedDiscovery {
        transports: Mutex<VecDeque<Option<MockTransport>>>,
    }

    impl ScriptedDiscovery {
        fn new(transports: Vec<Option<MockTransport>>) -> Self {
            ScriptedDiscovery {
                transports: Mutex::new(transports.into()),
            }
        }
    }

    #[async_trait]
    impl Discovery for ScriptedDiscovery {
        async fn discover(&self) -> Result<DeviceSession> {
            let next = self.transports.lock().unwrap().pop_front().flatten();
            match next {
                Some(t) => Ok(DeviceSession::new(Box::new(t), SessionConfig::default())),
                None => Err(Error::Discovery("nothing scripted".into())),
            }
        }
    }

    type Events = broadcast::Receiver<WorkerEvent>;

    async fn next_event(rx: &mut Events) -> WorkerEvent {
        tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("no worker event")
            .expect("event channel closed")
    }

    async fn next_status(rx: &mut Events) -> WorkerStatus {
        loop {
            if let WorkerEvent::Status(s) = next_event(rx).await {
                return s;
            }
        }
    }

    async fn next_snapshot(rx: &mut Events) -> MeasurementSnapshot {
        loop {
            if let WorkerEvent::Snapshot(s) = next_event(rx).await {
                return s;
            }
        }
    }

    async fn next_report(rx: &mut Events) -> px100_core::CommandReport {
        loop {
            if let WorkerEvent::CommandCompleted(r) = next_event(rx).await {
                return r;
            }
        }
    }

    fn one_device(device: &SimulatedPx100) -> (ScriptedDiscovery, SentLog) {
        let transport = device.transport_on("/dev/ttyUSB0");
        let log = transport.sent_log();
        (ScriptedDiscovery::new(vec![Some(transport)]), log)
    }

    fn is_code(code: u8) -> impl Fn(&[u8]) -> bool {
        move |f: &[u8]| f[2] == code
    }

    #[tokio::test(start_paused = true)]
    async fn no_device_stops_the_worker() {
        let (worker, mut rx) = WorkerBuilder::new()
            .spawn(ScriptedDiscovery::new(vec![]))
            .unwrap();

        assert_eq!(next_status(&mut rx).await, WorkerStatus::NoDevice);
        worker.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn connected_worker_polls_when_started() {
        let device = SimulatedPx100::new();
        let (discovery, _log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        assert_eq!(
            next_status(&mut rx).await,
            WorkerStatus::Connected {
                name: "PX100".into(),
                port: "/dev/ttyUSB0".into()
            }
        );
        let snap = next_snapshot(&mut rx).await;
        assert!(!snap.is_on);
        assert_eq!(snap.voltage, 12.0);
        assert_eq!(snap.current, 0.0);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_group_every_fifth_cycle() {
        let device = SimulatedPx100::new();
        let (discovery, log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        let mut aux_reads = Vec::new();
        let mut snaps = Vec::new();
        for _ in 0..10 {
            snaps.push(next_snapshot(&mut rx).await);
            aux_reads.push(log.count(is_code(0x15)));
        }
        assert_eq!(aux_reads, vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 2]);
        assert_eq!(log.count(is_code(0x10)), 10);

        // Power-on defaults until the first auxiliary read.
        assert_eq!(snaps[3].set_current, 0.0);
        assert_eq!(snaps[4].set_current, 1.5);
        assert_eq!(snaps[4].set_voltage, 10.0);
        assert_eq!(snaps[4].temp, 25.0);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_worker_does_not_poll() {
        let device = SimulatedPx100::new();
        let (discovery, log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().spawn(discovery).unwrap();

        next_status(&mut rx).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(log.is_empty());
        assert!(!worker.is_running());

        worker.start();
        next_snapshot(&mut rx).await;
        worker.stop();
        let polled = log.len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(log.len(), polled);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn command_is_verified_and_merged_into_snapshot() {
        let device = SimulatedPx100::new();
        let (discovery, _log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().spawn(discovery).unwrap();

        worker.enqueue(CommandKind::SetVoltage, Value::Decimal(3.14)).unwrap();
        let report = next_report(&mut rx).await;
        assert!(report.verified);
        assert_eq!(report.attempts, 1);
        assert_eq!(device.voltage_limit(), 3.14);

        // The verified value shows up before the first auxiliary read.
        worker.start();
        let snap = next_snapshot(&mut rx).await;
        assert_eq!(snap.set_voltage, 3.14);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unverified_command_is_reported_not_fatal() {
        let device = SimulatedPx100::new();
        device.set_ignore_writes(true);
        let (discovery, log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        worker.enqueue_command(CommandRequest::enable(true)).unwrap();
        let report = next_report(&mut rx).await;
        assert!(!report.verified);
        assert_eq!(report.attempts, 3);
        assert_eq!(log.count(is_code(0x01)), 3);

        // Polling carries on.
        next_snapshot(&mut rx).await;
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn one_command_per_iteration_interleaves_with_polls() {
        let device = SimulatedPx100::new();
        let (discovery, _log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        worker.enqueue_command(CommandRequest::set_current(1.0).unwrap()).unwrap();
        worker.enqueue_command(CommandRequest::set_current(2.0).unwrap()).unwrap();
        worker.enqueue_command(CommandRequest::reset()).unwrap();

        next_status(&mut rx).await;
        let mut kinds = Vec::new();
        for _ in 0..6 {
            kinds.push(match next_event(&mut rx).await {
                WorkerEvent::CommandCompleted(r) => r.kind.key(),
                WorkerEvent::Snapshot(_) => "snapshot",
                WorkerEvent::Status(s) => panic!("unexpected status {s}"),
            });
        }
        assert_eq!(
            kinds,
            vec!["set_current", "snapshot", "set_current", "snapshot", "reset", "snapshot"]
        );
        assert_eq!(device.current_limit(), 2.0);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_past_one_day_keeps_polling() {
        let device = SimulatedPx100::new();
        device.set_elapsed_seconds(24 * 3600 + 5);
        let (discovery, log) = one_device(&device);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();
        worker.enqueue_command(CommandRequest::enable(true)).unwrap();

        assert!(matches!(next_status(&mut rx).await, WorkerStatus::Connected { .. }));
        let mut snapshots = 0;
        while snapshots < 12 {
            match next_event(&mut rx).await {
                WorkerEvent::Snapshot(s) => {
                    assert_eq!(s.time, Hms::new(24, 0, 5).unwrap());
                    assert!(s.is_on);
                    snapshots += 1;
                }
                WorkerEvent::CommandCompleted(r) => assert!(r.verified),
                WorkerEvent::Status(s) => panic!("unexpected status {s}"),
            }
        }

        // Only the enable write; the output was never switched off.
        assert!(device.output_on());
        assert_eq!(log.count(is_code(0x01)), 1);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_command_is_rejected_at_enqueue() {
        let device = SimulatedPx100::new();
        let (discovery, _log) = one_device(&device);
        let (worker, _rx) = WorkerBuilder::new().spawn(discovery).unwrap();

        let err = worker
            .enqueue(CommandKind::SetTimer, Value::Decimal(1.0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_trigger_reconnect() {
        let first = SimulatedPx100::new();
        let second = SimulatedPx100::new();
        let t1 = first.transport_on("/dev/ttyUSB0");
        let t2 = second.transport_on("/dev/ttyUSB1");
        let log1 = t1.sent_log();
        let connected1 = t1.connected_flag();
        let discovery = ScriptedDiscovery::new(vec![Some(t1), Some(t2)]);

        first.set_silent(true);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        assert!(matches!(next_status(&mut rx).await, WorkerStatus::Connected { .. }));
        assert_eq!(
            next_status(&mut rx).await,
            WorkerStatus::ConnectionLost { failures: 10 }
        );
        assert_eq!(
            next_status(&mut rx).await,
            WorkerStatus::Reconnected {
                port: "/dev/ttyUSB1".into()
            }
        );

        // Ten failed polls, then the output-off write on close.
        assert_eq!(log1.count(is_code(0x10)), 10);
        assert_eq!(log1.frames().last().unwrap(), &vec![0xB1, 0xB2, 0x01, 0x00, 0x00, 0xB6]);
        assert!(!*connected1.lock().unwrap());

        let snap = next_snapshot(&mut rx).await;
        assert_eq!(snap.voltage, 12.0);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnection_resets_failure_count() {
        let first = SimulatedPx100::new();
        let second = SimulatedPx100::new();
        let t2 = second.transport_on("/dev/ttyUSB1");
        let log2 = t2.sent_log();
        let discovery = ScriptedDiscovery::new(vec![Some(first.transport()), Some(t2)]);
        first.set_silent(true);
        second.set_silent(true);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        assert!(matches!(next_status(&mut rx).await, WorkerStatus::Connected { .. }));
        assert_eq!(
            next_status(&mut rx).await,
            WorkerStatus::ConnectionLost { failures: 10 }
        );
        assert!(matches!(
            next_status(&mut rx).await,
            WorkerStatus::Reconnected { .. }
        ));

        // Nine failures on the new link stay below the threshold.
        while log2.count(is_code(0x10)) < 9 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        second.set_silent(false);

        match next_event(&mut rx).await {
            WorkerEvent::Snapshot(s) => assert_eq!(s.voltage, 12.0),
            other => panic!("expected a snapshot, got {other:?}"),
        }
        assert_eq!(log2.count(is_code(0x10)), 10);
        assert_eq!(log2.count(is_code(0x01)), 0);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn commands_wait_for_reconnection() {
        let first = SimulatedPx100::new();
        let second = SimulatedPx100::new();
        let discovery = ScriptedDiscovery::new(vec![
            Some(first.transport()),
            None,
            Some(second.transport()),
        ]);
        first.set_silent(true);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        next_status(&mut rx).await;
        assert!(matches!(
            next_status(&mut rx).await,
            WorkerStatus::ConnectionLost { .. }
        ));
        worker.enqueue_command(CommandRequest::set_current(2.5).unwrap()).unwrap();
        assert_eq!(
            next_status(&mut rx).await,
            WorkerStatus::ReconnectFailed { attempt: 1 }
        );
        assert!(matches!(
            next_status(&mut rx).await,
            WorkerStatus::Reconnected { .. }
        ));

        let report = next_report(&mut rx).await;
        assert!(report.verified);
        assert_eq!(second.current_limit(), 2.5);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_reconnect_attempts() {
        let device = SimulatedPx100::new();
        let discovery = ScriptedDiscovery::new(vec![Some(device.transport())]);
        device.set_silent(true);
        let (worker, mut rx) = WorkerBuilder::new()
            .start_running(true)
            .max_reconnect_attempts(2)
            .spawn(discovery)
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..5 {
            statuses.push(next_status(&mut rx).await);
        }
        assert_eq!(
            statuses[1..],
            [
                WorkerStatus::ConnectionLost { failures: 10 },
                WorkerStatus::ReconnectFailed { attempt: 1 },
                WorkerStatus::ReconnectFailed { attempt: 2 },
                WorkerStatus::GaveUp { attempts: 2 },
            ]
        );
        worker.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exit_disables_output_and_closes() {
        let device = SimulatedPx100::new();
        let transport = device.transport();
        let log = transport.sent_log();
        let connected = transport.connected_flag();
        let discovery = ScriptedDiscovery::new(vec![Some(transport)]);
        let (worker, mut rx) = WorkerBuilder::new().start_running(true).spawn(discovery).unwrap();

        worker.enqueue_command(CommandRequest::enable(true)).unwrap();
        assert!(next_report(&mut rx).await.verified);
        assert!(device.output_on());

        worker.request_exit();
        assert_eq!(next_status(&mut rx).await, WorkerStatus::Disconnected);
        worker.join().await.unwrap();

        assert!(!device.output_on());
        assert_eq!(log.frames().last().unwrap(), &vec![0xB1, 0xB2, 0x01, 0x00, 0x00, 0xB6]);
        assert!(!*connected.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_exits() {
        let device = SimulatedPx100::new();
        let transport = device.transport();
        let connected = transport.connected_flag();
        let discovery = ScriptedDiscovery::new(vec![Some(transport)]);
        let (worker, mut rx) = WorkerBuilder::new().spawn(discovery).unwrap();

        next_status(&mut rx).await;
        drop(worker);
        assert_eq!(next_status(&mut rx).await, WorkerStatus::Disconnected);
        assert!(!*connected.lock().unwrap());
    }
}

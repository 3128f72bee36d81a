//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait in two modes that can
//! be combined:
//!
//! - **Expectations**: ordered request/response pairs. Each `send()` must
//!   match the next expectation exactly and arms its response.
//! - **Responder**: a closure consulted once the expectations run out,
//!   mapping each request to a response. Used to simulate a whole
//!   instrument for long-running worker tests.
//!
//! An empty response makes the next `receive()` time out, which is how a
//! silent instrument looks on the wire.
//!
//! # Example
//!
//! ```
//! use px100_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Read voltage, instrument answers 12.000 V.
//! mock.expect(&[0xB1, 0xB2, 0x11, 0x00, 0x00, 0xB6],
//!             &[0xCA, 0xCB, 0x00, 0x2E, 0xE0, 0xCE, 0xCF]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use px100_core::error::{Error, Result};
use px100_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send + Sync>;

/// Shared view of everything sent through a [`MockTransport`].
///
/// Clones observe the same log, so a test can keep one after boxing the
/// transport into a session.
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    inner: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SentLog {
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, data: &[u8]) {
        self.lock().push(data.to_vec());
    }

    /// Copy of every frame sent so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// Number of frames sent so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of sent frames for which `pred` holds.
    pub fn count(&self, pred: impl Fn(&[u8]) -> bool) -> usize {
        self.lock().iter().filter(|f| pred(f)).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// A mock [`Transport`] for testing the protocol engine without hardware.
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    responder: Option<Responder>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    connected: Arc<Mutex<bool>>,
    sent_log: SentLog,
    endpoint: String,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("expectations", &self.expectations)
            .field("responder", &self.responder.is_some())
            .field("pending_response", &self.pending_response)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            responder: None,
            pending_response: None,
            response_cursor: 0,
            connected: Arc::new(Mutex::new(true)),
            sent_log: SentLog::default(),
            endpoint: "mock".to_string(),
        }
    }

    /// Create a mock that answers every request through `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let mut mock = Self::new();
        mock.responder = Some(Box::new(responder));
        mock
    }

    /// Set the endpoint name reported through [`Transport::endpoint`].
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, the subsequent
    /// `receive()` calls return `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Return a copy of every frame sent through this transport.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent_log.frames()
    }

    /// Return a shared handle to the sent-frame log.
    pub fn sent_log(&self) -> SentLog {
        self.sent_log.clone()
    }

    /// Return a shared handle to the connected flag.
    ///
    /// Lets a test observe that the session closed the transport after the
    /// mock has been moved into it.
    pub fn connected_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.connected)
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner()) = connected;
    }

    fn connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected() {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data);

        let response = if let Some(expectation) = self.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            expectation.response
        } else if let Some(responder) = self.responder.as_mut() {
            responder(data)
        } else {
            return Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ));
        };

        self.pending_response = Some(response);
        self.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected() {
            return Err(Error::NotConnected);
        }

        if let Some(ref response) = self.pending_response {
            let remaining = &response[self.response_cursor..];
            if remaining.is_empty() {
                self.pending_response = None;
                self.response_cursor = 0;
                return Err(Error::Timeout);
            }
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.response_cursor += n;
            if self.response_cursor >= response.len() {
                self.pending_response = None;
                self.response_cursor = 0;
            }
            Ok(n)
        } else {
            Err(Error::Timeout)
        }
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.set_connected(false);
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        let request = &[0xB1, 0xB2, 0x11, 0x00, 0x00, 0xB6];
        let response = &[0xCA, 0xCB, 0x00, 0x2E, 0xE0, 0xCE, 0xCF];

        mock.expect(request, response);
        mock.send(request).await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(n, response.len());
        assert_eq!(&buf[..n], response);
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data() {
        let mut mock = MockTransport::new();
        let log = mock.sent_log();
        mock.expect(&[0x01, 0x02], &[0x6F]);
        mock.expect(&[0x03, 0x04], &[0x6F]);

        mock.send(&[0x01, 0x02]).await.unwrap();
        mock.send(&[0x03, 0x04]).await.unwrap();

        assert_eq!(mock.sent_data().len(), 2);
        assert_eq!(log.frames()[1], vec![0x03, 0x04]);
        assert_eq!(log.count(|f| f[0] == 0x01), 1);
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0x6F]);

        let result = mock.send(&[0x99]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_empty_response_times_out() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[]);
        mock.send(&[0x01]).await.unwrap();

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn mock_transport_responder_after_expectations() {
        let mut mock = MockTransport::with_responder(|req| vec![req[0].wrapping_add(1)]);
        mock.expect(&[0x10], &[0xAA]);

        let mut buf = [0u8; 4];
        mock.send(&[0x10]).await.unwrap();
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA]);

        mock.send(&[0x10]).await.unwrap();
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0x11]);
    }

    #[tokio::test]
    async fn mock_transport_disconnect_visible_through_flag() {
        let mut mock = MockTransport::new();
        let flag = mock.connected_flag();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(!*flag.lock().unwrap());

        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xAA, 0xBB, 0xCC, 0xDD]);
        mock.send(&[0x01]).await.unwrap();

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
        let n = mock.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn mock_transport_clear_input_drops_pending() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xAA]);
        mock.send(&[0x01]).await.unwrap();
        mock.clear_input().await.unwrap();

        let mut buf = [0u8; 2];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }
}

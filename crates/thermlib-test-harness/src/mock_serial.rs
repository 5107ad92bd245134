//! Mock transport for deterministic testing of sensor drivers.
//!
//! A [`MockLink`] is the shared "wire" between a test and the driver under
//! test. The test queues inbound data on it and inspects what the driver
//! sent; the driver reaches it through a [`MockConnector`], which hands out
//! [`MockTransport`]s bound to the same link.
//!
//! Each queued chunk is returned by exactly one `receive()` call, which lets
//! tests reproduce fragmented serial reads. A [`gap`](MockLink::push_gap)
//! makes the next `receive()` time out immediately, marking the end of a
//! burst without relying on wall-clock timing.
//!
//! # Example
//!
//! ```
//! use thermlib_test_harness::{MockConnector, MockLink};
//!
//! let link = MockLink::new();
//! link.push_chunk(&[0x5A, 0x5A, 0x02, 0x06]);
//! link.push_gap();
//! let connector = MockConnector::new(link.clone()).fail_first(1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thermlib_core::error::{Error, Result};
use thermlib_core::transport::{Connector, Transport};
use tokio::sync::Notify;

/// One queued item on the inbound side of the link.
#[derive(Debug, Clone)]
enum Inbound {
    Data(Vec<u8>),
    Gap,
}

#[derive(Debug, Default)]
struct LinkState {
    inbound: VecDeque<Inbound>,
    sent_log: Vec<Vec<u8>>,
    connected: bool,
    fail_writes: bool,
    opened: Vec<(String, u32)>,
    closes: u32,
}

#[derive(Debug, Default)]
struct LinkInner {
    state: Mutex<LinkState>,
    data_ready: Notify,
}

/// Shared, cloneable handle to a mock serial line.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    inner: Arc<LinkInner>,
}

impl MockLink {
    /// Create an empty, disconnected link.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        // A panicking test thread must not wedge the others.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `data` to be returned by a single `receive()` call.
    pub fn push_chunk(&self, data: &[u8]) {
        self.state().inbound.push_back(Inbound::Data(data.to_vec()));
        self.inner.data_ready.notify_one();
    }

    /// Queue `data` split into chunks of at most `chunk_size` bytes.
    pub fn push_fragmented(&self, data: &[u8], chunk_size: usize) {
        {
            let mut state = self.state();
            for chunk in data.chunks(chunk_size.max(1)) {
                state.inbound.push_back(Inbound::Data(chunk.to_vec()));
            }
        }
        self.inner.data_ready.notify_one();
    }

    /// Queue a forced timeout.
    pub fn push_gap(&self) {
        self.state().inbound.push_back(Inbound::Gap);
        self.inner.data_ready.notify_one();
    }

    /// Queue `data` as one chunk followed by a gap.
    pub fn push_burst(&self, data: &[u8]) {
        {
            let mut state = self.state();
            state.inbound.push_back(Inbound::Data(data.to_vec()));
            state.inbound.push_back(Inbound::Gap);
        }
        self.inner.data_ready.notify_one();
    }

    /// Number of inbound items not yet consumed.
    pub fn pending_inbound(&self) -> usize {
        self.state().inbound.len()
    }

    /// Every byte slice written through any transport on this link.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// Make subsequent `send()` calls fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Whether a transport on this link is currently open.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// `(path, baud_rate)` of every successful open, in order.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.state().opened.clone()
    }

    /// Number of times a transport on this link was closed.
    pub fn close_count(&self) -> u32 {
        self.state().closes
    }

    fn take_inbound(&self, buf: &mut [u8]) -> Option<Inbound> {
        let mut state = self.state();
        match state.inbound.pop_front()? {
            Inbound::Gap => Some(Inbound::Gap),
            Inbound::Data(mut data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    // Leave the unread tail at the front of the queue.
                    state.inbound.push_front(Inbound::Data(data.split_off(n)));
                }
                data.truncate(n);
                Some(Inbound::Data(data))
            }
        }
    }
}

/// A [`Transport`] bound to a [`MockLink`].
#[derive(Debug)]
pub struct MockTransport {
    link: MockLink,
    connected: bool,
}

impl MockTransport {
    /// Create a connected transport on `link`.
    pub fn new(link: MockLink) -> Self {
        link.state().connected = true;
        MockTransport {
            link,
            connected: true,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut state = self.link.state();
        state.sent_log.push(data.to_vec());
        if state.fail_writes {
            return Err(Error::Io(std::io::Error::other("mock write failure")));
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        for waited in [false, true] {
            match self.link.take_inbound(buf) {
                Some(Inbound::Data(data)) => return Ok(data.len()),
                Some(Inbound::Gap) => return Err(Error::Timeout),
                None if waited => break,
                None => {
                    let notified = self.link.inner.data_ready.notified();
                    if tokio::time::timeout(timeout, notified).await.is_err() {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            let mut state = self.link.state();
            state.connected = false;
            state.closes += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A [`Connector`] handing out [`MockTransport`]s on one shared link.
#[derive(Debug)]
pub struct MockConnector {
    link: MockLink,
    failures_left: AtomicU32,
    attempts: Arc<AtomicU32>,
}

impl MockConnector {
    /// Create a connector whose every `connect` succeeds.
    pub fn new(link: MockLink) -> Self {
        MockConnector {
            link,
            failures_left: AtomicU32::new(0),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the first `n` connect attempts fail with a transport error.
    pub fn fail_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Shared counter of connect attempts, readable after the connector
    /// has been moved into a driver.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, path: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::Transport(format!("mock open failure on {path}")));
        }

        self.link
            .state()
            .opened
            .push((path.to_string(), baud_rate));
        Ok(Box::new(MockTransport::new(self.link.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_returns_one_chunk_per_receive() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        link.push_chunk(&[0x01, 0x02]);
        link.push_chunk(&[0x03]);

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02]);
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0x03]);
    }

    #[tokio::test]
    async fn mock_transport_partial_receive_keeps_tail() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        link.push_chunk(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = [0u8; 3];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB, 0xCC]);
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[0xDD]);
    }

    #[tokio::test]
    async fn mock_transport_gap_times_out() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        link.push_burst(&[0x01]);

        let mut buf = [0u8; 8];
        assert_eq!(
            mock.receive(&mut buf, Duration::from_secs(5)).await.unwrap(),
            1
        );
        let result = mock.receive(&mut buf, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(link.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn mock_transport_empty_times_out() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link);
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_transport_wakes_on_late_data() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());

        let pusher = link.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push_chunk(&[0x42]);
        });

        let mut buf = [0u8; 8];
        let n = mock.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf[..n], &[0x42]);
    }

    #[tokio::test]
    async fn mock_transport_records_sends() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        mock.send(&[0xA5, 0x25, 0x01, 0xCB]).await.unwrap();
        assert_eq!(link.sent_data(), vec![vec![0xA5, 0x25, 0x01, 0xCB]]);
    }

    #[tokio::test]
    async fn mock_transport_write_failure_still_logged() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        link.set_fail_writes(true);
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::Io(_))));
        assert_eq!(link.sent_data().len(), 1);
    }

    #[tokio::test]
    async fn mock_transport_close() {
        let link = MockLink::new();
        let mut mock = MockTransport::new(link.clone());
        assert!(link.is_connected());

        mock.close().await.unwrap();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(!link.is_connected());
        assert_eq!(link.close_count(), 1);

        assert!(matches!(mock.send(&[0x01]).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_connector_fails_then_succeeds() {
        let link = MockLink::new();
        let connector = MockConnector::new(link.clone()).fail_first(2);
        let attempts = connector.attempts();

        assert!(connector.connect("/dev/mock", 460_800).await.is_err());
        assert!(connector.connect("/dev/mock", 460_800).await.is_err());
        let transport = connector.connect("/dev/mock", 460_800).await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(link.opened(), vec![("/dev/mock".to_string(), 460_800)]);
    }
}

//! Transport and connector traits for sensor communication.
//!
//! The [`Transport`] trait abstracts over the byte link to a sensor. Sensor
//! drivers never open ports themselves: they ask a [`Connector`] for a fresh
//! transport each time a session (re)opens, so the same driver runs against a
//! real serial port or a `MockConnector` from `thermlib-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a sensor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` to the sensor.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available into `buf`.
    ///
    /// Waits up to `timeout` for data to arrive; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if none does.
    /// Implementations must be cancel-safe: dropping the future before it
    /// completes must not lose bytes.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport. Later `send`/`receive` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open.
    fn is_connected(&self) -> bool;
}

/// Factory for transports.
///
/// A device's IO task owns one `Connector` for its whole lifetime and calls
/// [`connect`](Connector::connect) on every open attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `path` at `baud_rate`.
    async fn connect(&self, path: &str, baud_rate: u32) -> Result<Box<dyn Transport>>;
}

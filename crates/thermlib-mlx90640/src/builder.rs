//! Mlx90640Builder -- fluent builder for constructing [`Mlx90640`] handles.
//!
//! Separates configuration from construction so that callers can set
//! timing, geometry and serial line settings before the first `open()`.
//! Building never touches the port; the IO task opens it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use thermlib_mlx90640::builder::Mlx90640Builder;
//!
//! # async fn example() -> thermlib_core::Result<()> {
//! let (camera, mut frames) = Mlx90640Builder::new()
//!     .open_timeout(Duration::from_secs(2))
//!     .build()?;
//! camera.open("/dev/ttyUSB0", 460_800).await;
//! if let Some(frame) = frames.recv().await {
//!     println!("hottest: {:.1} C", frame.hottest.celsius());
//! }
//! camera.close().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use thermlib_core::error::{Error, Result};
use thermlib_core::transport::Connector;
use thermlib_core::types::SensorGeometry;
use thermlib_transport::{SerialConfig, SerialConnector};

use crate::colorize::ColorScalar;
use crate::device::{FrameReceiver, Mlx90640};
use crate::io::IoConfig;

/// Fluent builder for [`Mlx90640`].
///
/// Every setting has a default matching the MLX90640 serial module, so
/// `Mlx90640Builder::new().build()` is a working configuration.
#[derive(Debug, Clone)]
pub struct Mlx90640Builder {
    geometry: SensorGeometry,
    open_timeout: Duration,
    poll_interval: Duration,
    coalesce_timeout: Duration,
    color_scalar: ColorScalar,
    event_capacity: usize,
    serial_config: SerialConfig,
}

impl Default for Mlx90640Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Mlx90640Builder {
    pub fn new() -> Self {
        Mlx90640Builder {
            geometry: SensorGeometry::MLX90640,
            open_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
            coalesce_timeout: Duration::from_millis(10),
            color_scalar: ColorScalar::default(),
            event_capacity: 64,
            serial_config: SerialConfig::default(),
        }
    }

    /// Sensor array size (default 24x32).
    pub fn geometry(mut self, geometry: SensorGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// How long `open()` waits for the port before returning `false`
    /// (default: 1s). The IO task keeps retrying afterwards.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Idle receive timeout, also the delay between open attempts
    /// (default: 50ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Quiet time that ends a fragmented packet (default: 10ms).
    pub fn coalesce_timeout(mut self, timeout: Duration) -> Self {
        self.coalesce_timeout = timeout;
        self
    }

    /// Initial false-color gains.
    pub fn color_scalar(mut self, scalar: ColorScalar) -> Self {
        self.color_scalar = scalar;
        self
    }

    /// Capacity of the event broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Serial line settings used by [`build()`](Self::build). The baud rate
    /// passed to `open()` overrides the one in `config`.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial_config = config;
        self
    }

    /// Build an [`Mlx90640`] with a caller-provided connector.
    ///
    /// This is the entry point for tests (pass a `MockConnector` from
    /// `thermlib-test-harness`).
    pub fn build_with_connector(
        self,
        connector: Box<dyn Connector>,
    ) -> Result<(Mlx90640, FrameReceiver)> {
        if self.geometry.pixel_count() == 0 {
            return Err(Error::InvalidParameter(format!(
                "geometry {} has no pixels",
                self.geometry
            )));
        }
        if self.poll_interval.is_zero() || self.coalesce_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "poll_interval and coalesce_timeout must be non-zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be at least 1".into(),
            ));
        }

        let config = IoConfig {
            geometry: self.geometry,
            poll_interval: self.poll_interval,
            coalesce_timeout: self.coalesce_timeout,
        };
        Ok(Mlx90640::new(
            connector,
            config,
            self.open_timeout,
            self.color_scalar,
            self.event_capacity,
        ))
    }

    /// Build an [`Mlx90640`] that opens ports through [`SerialConnector`].
    pub fn build(self) -> Result<(Mlx90640, FrameReceiver)> {
        let connector = SerialConnector::with_config(self.serial_config.clone());
        self.build_with_connector(Box::new(connector))
    }
}

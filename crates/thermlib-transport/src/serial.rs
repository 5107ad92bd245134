//! Serial port transport for sensor communication.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for USB virtual COM ports, and [`SerialConnector`],
//! the [`Connector`] sensor drivers use to open it.
//!
//! MLX90640 serial modules talk 8N1 without flow control at either 115200
//! or 460800 baud.
//!
//! # Example
//!
//! ```no_run
//! use thermlib_transport::SerialTransport;
//! use thermlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> thermlib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 460_800).await?;
//!
//! // Switch the module to 4 Hz.
//! transport.send(&[0xA5, 0x25, 0x02, 0xCC]).await?;
//!
//! let mut buf = [0u8; 2048];
//! let n = transport.receive(&mut buf, Duration::from_millis(50)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use thermlib_core::error::{Error, Result};
use thermlib_core::transport::{Connector, Transport};
use thermlib_core::types::BAUD_RATE_460800;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

/// Serial port configuration.
///
/// Defaults match the MLX90640 modules: 460800 baud, 8 data bits, 1 stop
/// bit, no parity, no flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE_460800,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Serial port transport.
pub struct SerialTransport {
    port: Option<SerialStream>,
    /// Port name for logging.
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at `baud_rate` with otherwise default settings.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .open_native_async()
            .map_err(|e| {
                tracing::debug!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        // Discard whatever the module pushed before we were listening so the
        // first read starts near a packet boundary.
        if let Err(e) = stream.clear(ClearBuffer::Input) {
            tracing::warn!(port = %port, error = %e, "Failed to clear input buffer");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), data = ?data, "Sending data");

        port.write_all(data).await.map_err(map_io_error)?;
        port.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(0)) => Err(Error::ConnectionLost),
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::debug!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(port) = self.port.take() {
            if let Err(e) = port.clear(ClearBuffer::All) {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to clear buffers before closing (continuing anyway)"
                );
            }
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

/// [`Connector`] that opens [`SerialTransport`]s.
///
/// Everything except the baud rate comes from the connector's
/// [`SerialConfig`]; the baud rate is chosen per `connect` call.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    /// Create a connector with default 8N1 settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector with custom line settings.
    pub fn with_config(config: SerialConfig) -> Self {
        SerialConnector { config }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, path: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
        let config = SerialConfig {
            baud_rate,
            ..self.config.clone()
        };
        let transport = SerialTransport::open_with_config(path, config).await?;
        Ok(Box::new(transport))
    }
}

/// List the serial ports on this machine that can currently be opened.
///
/// Each candidate is probed by opening and immediately closing it, so ports
/// held by another process are left out. This call blocks while probing.
pub fn enumerate_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;

    let usable = ports
        .into_iter()
        .filter(|info| {
            match tokio_serial::new(&info.port_name, BAUD_RATE_460800).open() {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(port = %info.port_name, error = %e, "Skipping port");
                    false
                }
            }
        })
        .map(|info| info.port_name)
        .collect();

    Ok(usable)
}

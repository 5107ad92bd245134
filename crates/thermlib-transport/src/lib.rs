//! Transport implementations for thermlib.
//!
//! This crate provides the serial implementation of the
//! [`Transport`](thermlib_core::Transport) and
//! [`Connector`](thermlib_core::Connector) traits from `thermlib-core`,
//! plus serial port enumeration.
//!
//! # Example
//!
//! ```no_run
//! use thermlib_transport::enumerate_ports;
//!
//! # fn example() -> thermlib_core::Result<()> {
//! for port in enumerate_ports()? {
//!     println!("{port}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialConnector, SerialTransport, enumerate_ports};
pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

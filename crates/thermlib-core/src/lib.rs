//! thermlib-core: Core traits, types, and error definitions for thermlib.
//!
//! This crate defines the sensor-agnostic abstractions shared by the
//! transport implementations and the sensor drivers. Applications can depend
//! on these types without pulling in a specific driver.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level communication channel and
//!   its factory
//! - [`ThermalFrame`] -- a decoded, colorized frame
//! - [`ConnectionState`] -- session lifecycle
//! - [`DeviceEvent`] -- diagnostic notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::{DeviceEvent, DropReason};
pub use transport::{Connector, Transport};
pub use types::*;

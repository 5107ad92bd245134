//! thermlib-test-harness: Mock transports for testing thermlib drivers.
//!
//! This crate provides [`MockLink`], [`MockTransport`] and [`MockConnector`]
//! for deterministic tests of sensor drivers without real hardware.

pub mod mock_serial;

pub use mock_serial::{MockConnector, MockLink, MockTransport};

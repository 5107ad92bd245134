//! # thermlib -- Serial Thermal Camera Drivers
//!
//! `thermlib` is an asynchronous Rust library for thermal-imaging sensor
//! modules that stream frames over a serial line. It reads raw temperature
//! packets, corrects them against the sensor's ambient reading and renders
//! false-color RGB images ready for display.
//!
//! ## Quick Start
//!
//! Add `thermlib` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! thermlib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Open a camera and print the hottest pixel of each frame:
//!
//! ```no_run
//! use thermlib::mlx90640::{Frequency, Mlx90640Builder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (camera, mut frames) = Mlx90640Builder::new().build()?;
//!     if !camera.open("/dev/ttyUSB0", thermlib::BAUD_RATE_460800).await {
//!         anyhow::bail!("camera did not answer");
//!     }
//!     camera.set_frequency(Frequency::Hz4);
//!
//!     while let Some(frame) = frames.recv().await {
//!         println!("#{} hottest {:.1} C", frame.sequence, frame.hottest.celsius());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `thermlib-core`        | [`Transport`]/[`Connector`] traits, types, errors |
//! | `thermlib-transport`   | Serial transport and port enumeration            |
//! | `thermlib-mlx90640`    | MLX90640 packet codec, colorizer and driver      |
//! | **`thermlib`**         | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                              | Default |
//! |------------|--------------------------------------|---------|
//! | `mlx90640` | [`mlx90640`] module                  | yes     |
//!
//! ## Frames and Events
//!
//! Frames arrive on the single-slot channel returned by the builder. A
//! consumer that falls behind loses frames rather than stalling the sensor;
//! the losses are visible in the driver's statistics. Diagnostic
//! [`DeviceEvent`]s (state changes, open retries, dropped buffers) are
//! published on a separate broadcast channel:
//!
//! ```no_run
//! use thermlib::DeviceEvent;
//! # async fn example(camera: &thermlib::mlx90640::Mlx90640) {
//! let mut events = camera.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let DeviceEvent::FrameDropped { reason, len } = event {
//!         println!("dropped {len}-byte buffer: {reason}");
//!     }
//! }
//! # }
//! ```

pub use thermlib_core::*;

/// Serial transport and port enumeration.
pub mod transport {
    pub use thermlib_transport::*;
}

/// Melexis MLX90640 serial module driver.
///
/// Provides [`Mlx90640`](mlx90640::Mlx90640) and
/// [`Mlx90640Builder`](mlx90640::Mlx90640Builder) for the 24x32 array
/// modules that push 1544-byte frame packets.
#[cfg(feature = "mlx90640")]
pub mod mlx90640 {
    pub use thermlib_mlx90640::*;
}

/// List the serial ports that can currently be opened.
///
/// Shorthand for [`transport::enumerate_ports`].
pub fn available_ports() -> Result<Vec<String>> {
    thermlib_transport::enumerate_ports()
}

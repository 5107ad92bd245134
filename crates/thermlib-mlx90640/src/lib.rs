//! MLX90640 serial thermal camera driver for thermlib.
//!
//! This crate drives the serial modules built around the Melexis MLX90640
//! 24x32 infrared array. The module pushes one packet per sensor frame;
//! the driver decodes it, applies the ambient correction, renders a
//! false-color RGB image and hands the result out as a
//! [`ThermalFrame`](thermlib_core::ThermalFrame). It provides:
//!
//! - **Packet codec** ([`packet`]) -- validate and decode frame packets,
//!   ambient correction, and a packet encoder for tests and simulators.
//! - **Colorizer** ([`colorize`]) -- min/max normalization with per-channel
//!   gains, plus hottest/coldest pixel location.
//! - **Command builders** ([`commands`]) -- refresh rate, acquisition mode
//!   and emissivity command frames.
//! - **Mlx90640** ([`device`]) -- the device handle: open/close lifecycle,
//!   configuration setters, statistics and events.
//! - **Mlx90640Builder** ([`builder`]) -- fluent builder for timing,
//!   geometry and serial settings.
//!
//! # Example
//!
//! ```
//! use thermlib_mlx90640::colorize::{colorize, ColorScalar};
//! use thermlib_mlx90640::commands::{cmd_set_frequency, Frequency};
//! use thermlib_mlx90640::packet::{decode, encode_packet};
//! use thermlib_core::SensorGeometry;
//!
//! assert_eq!(cmd_set_frequency(Frequency::Hz4), [0xA5, 0x25, 0x02, 0xCC]);
//!
//! let geometry = SensorGeometry::new(2, 2);
//! let packet = encode_packet(geometry, &[100, 200, 300, 400], 150);
//! let decoded = decode(&packet, geometry).unwrap();
//!
//! let mut pixels = [0u8; 12];
//! let extrema = colorize(&decoded.temperatures, 2, &ColorScalar::default(), &mut pixels);
//! assert_eq!((extrema.hottest.row, extrema.hottest.col), (1, 1));
//! assert_eq!(&pixels[9..], &[204, 25, 25]);
//! ```

pub mod builder;
pub mod colorize;
pub mod commands;
pub mod device;
mod io;
pub mod packet;

pub use builder::Mlx90640Builder;
pub use colorize::ColorScalar;
pub use commands::{Emissivity, Frequency, Mode};
pub use device::{DeviceStats, FrameReceiver, Mlx90640};

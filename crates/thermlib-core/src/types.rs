//! Core types used throughout thermlib.
//!
//! These types describe sensors, connection lifecycle, and the frames a
//! driver hands to its consumer, independent of any particular sensor
//! protocol.

use std::fmt;

use bytes::Bytes;

/// 115200 baud, the factory rate of most MLX90640 serial modules.
pub const BAUD_RATE_115200: u32 = 115_200;

/// 460800 baud, required for the higher refresh rates.
pub const BAUD_RATE_460800: u32 = 460_800;

/// Scale of the raw temperature codes on the wire (hundredths of a degree).
pub const RAW_UNITS_PER_DEGREE: f32 = 100.0;

/// Convert a raw code (hundredths of a degree) to degrees Celsius.
pub fn raw_to_celsius(raw: f32) -> f32 {
    raw / RAW_UNITS_PER_DEGREE
}

/// Lifecycle state of a sensor connection.
///
/// Transitions follow a fixed graph:
///
/// ```text
/// Idle | Closed --> Opening --> Ready <--> Sending
/// Opening | Ready | Sending --> Terminating --> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    /// Waiting for the transport to open; retried until closed.
    Opening,
    /// Connected and receiving frames.
    Ready,
    /// A configuration command is pending transmission.
    Sending,
    /// Close requested; the IO task is shutting down.
    Terminating,
    /// The IO task has exited. The device may be opened again.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while a session (and its IO task) is alive.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Opening
                | ConnectionState::Ready
                | ConnectionState::Sending
                | ConnectionState::Terminating
        )
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle | Closed, Opening)
                | (Opening, Ready)
                | (Ready, Sending)
                | (Sending, Ready)
                | (Opening | Ready | Sending, Terminating)
                | (Terminating, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Opening => "opening",
            ConnectionState::Ready => "ready",
            ConnectionState::Sending => "sending",
            ConnectionState::Terminating => "terminating",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Pixel layout of a thermal sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorGeometry {
    /// Number of pixel rows.
    pub rows: usize,
    /// Number of pixel columns.
    pub cols: usize,
}

impl SensorGeometry {
    /// The MLX90640 far-infrared array: 24 rows of 32 pixels.
    pub const MLX90640: SensorGeometry = SensorGeometry { rows: 24, cols: 32 };

    /// Create a geometry of `rows` x `cols` pixels.
    pub const fn new(rows: usize, cols: usize) -> Self {
        SensorGeometry { rows, cols }
    }

    /// Total number of pixels.
    pub const fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Size in bytes of an interleaved RGB image of this geometry.
    pub const fn rgb_len(&self) -> usize {
        self.pixel_count() * 3
    }
}

impl fmt::Display for SensorGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Location and value of the hottest or coldest pixel in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extremum {
    /// Pixel row (index / cols).
    pub row: usize,
    /// Pixel column (index % cols).
    pub col: usize,
    /// Corrected temperature in raw hundredths of a degree.
    pub value: f32,
}

impl Extremum {
    /// The temperature in degrees Celsius.
    pub fn celsius(&self) -> f32 {
        raw_to_celsius(self.value)
    }
}

/// A fully processed frame, as delivered to the consumer.
///
/// Temperatures are ambient-corrected and kept in raw hundredths of a
/// degree; use [`ThermalFrame::celsius_at`] or [`raw_to_celsius`] for
/// physical units.
#[derive(Debug, Clone)]
pub struct ThermalFrame {
    /// Monotonic frame counter for the session, starting at 1.
    pub sequence: u64,
    /// Pixel layout of `pixels` and `temperatures`.
    pub geometry: SensorGeometry,
    /// Row-major interleaved RGB bytes, `geometry.rgb_len()` long.
    pub pixels: Bytes,
    /// Row-major corrected temperatures, `geometry.pixel_count()` long.
    pub temperatures: Vec<f32>,
    /// Ambient (sensor die) temperature in raw hundredths of a degree.
    pub ambient: f32,
    /// Hottest pixel.
    pub hottest: Extremum,
    /// Coldest pixel.
    pub coldest: Extremum,
}

impl ThermalFrame {
    /// Number of pixel rows.
    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    /// Number of pixel columns.
    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    /// Temperature in degrees Celsius at (`row`, `col`), if in bounds.
    pub fn celsius_at(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.geometry.rows || col >= self.geometry.cols {
            return None;
        }
        self.temperatures
            .get(row * self.geometry.cols + col)
            .copied()
            .map(raw_to_celsius)
    }

    /// Ambient temperature in degrees Celsius.
    pub fn ambient_celsius(&self) -> f32 {
        raw_to_celsius(self.ambient)
    }
}

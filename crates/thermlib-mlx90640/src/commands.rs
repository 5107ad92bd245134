//! Command frame builders for the MLX90640 serial module.
//!
//! Every command is four bytes:
//!
//! ```text
//! 0xA5 <class> <param> <trailer>
//! ```
//!
//! The trailer is a fixed value per (class, param) pair taken from the
//! module's command table; it is not computed here. The module never
//! acknowledges commands.

use std::fmt;
use std::str::FromStr;

use thermlib_core::{Error, Result};

/// Lead byte of every command frame.
pub const LEAD: u8 = 0xA5;

/// Command class: refresh rate.
pub const CLASS_FREQUENCY: u8 = 0x25;

/// Command class: acquisition mode.
pub const CLASS_MODE: u8 = 0x35;

/// Command class: emissivity.
pub const CLASS_EMISSIVITY: u8 = 0x45;

/// Trailer byte of the emissivity command, regardless of parameter.
pub const EMISSIVITY_TRAILER: u8 = 0xDC;

/// A complete command frame.
pub type CommandFrame = [u8; 4];

/// Sensor refresh rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Hz8,
    Hz4,
    Hz2,
}

impl Frequency {
    /// Refresh rate in frames per second.
    pub fn hz(&self) -> u32 {
        match self {
            Frequency::Hz8 => 8,
            Frequency::Hz4 => 4,
            Frequency::Hz2 => 2,
        }
    }

    fn param_and_trailer(&self) -> (u8, u8) {
        match self {
            Frequency::Hz8 => (0x01, 0xCB),
            Frequency::Hz4 => (0x02, 0xCC),
            Frequency::Hz2 => (0x03, 0xCD),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

impl FromStr for Frequency {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_suffix("hz").unwrap_or(lower.as_str()).trim() {
            "8" => Ok(Frequency::Hz8),
            "4" => Ok(Frequency::Hz4),
            "2" => Ok(Frequency::Hz2),
            _ => Err(ParseCommandError(format!("unknown frequency: {s}"))),
        }
    }
}

/// Acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The module streams frames continuously.
    Push,
    /// The module sends a frame only when asked.
    Request,
}

impl Mode {
    fn param_and_trailer(&self) -> (u8, u8) {
        match self {
            Mode::Push => (0x01, 0xDB),
            Mode::Request => (0x02, 0xDC),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Push => write!(f, "push"),
            Mode::Request => write!(f, "request"),
        }
    }
}

impl FromStr for Mode {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(Mode::Push),
            "request" | "req" => Ok(Mode::Request),
            _ => Err(ParseCommandError(format!("unknown mode: {s}"))),
        }
    }
}

/// Target emissivity, in `0.01..=1.0`.
///
/// Sent to the module in hundredths, so it is validated at construction and
/// encoding cannot fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emissivity(f32);

impl Emissivity {
    /// Validate an emissivity value.
    pub fn new(value: f32) -> Result<Self> {
        if !(0.01..=1.0).contains(&value) {
            return Err(Error::InvalidParameter(format!(
                "emissivity {value} outside 0.01..=1.0"
            )));
        }
        Ok(Emissivity(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Emissivity in hundredths, as carried in the command parameter.
    pub fn hundredths(&self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

impl FromStr for Emissivity {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| ParseCommandError(format!("invalid emissivity: {s}")))?;
        Emissivity::new(value).map_err(|e| ParseCommandError(e.to_string()))
    }
}

/// Error returned when a string cannot be parsed into a command setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

/// Build the "set refresh rate" command.
///
/// # Example
///
/// ```
/// use thermlib_mlx90640::commands::{cmd_set_frequency, Frequency};
///
/// assert_eq!(cmd_set_frequency(Frequency::Hz8), [0xA5, 0x25, 0x01, 0xCB]);
/// ```
pub fn cmd_set_frequency(freq: Frequency) -> CommandFrame {
    let (param, trailer) = freq.param_and_trailer();
    [LEAD, CLASS_FREQUENCY, param, trailer]
}

/// Build the "set acquisition mode" command.
pub fn cmd_set_mode(mode: Mode) -> CommandFrame {
    let (param, trailer) = mode.param_and_trailer();
    [LEAD, CLASS_MODE, param, trailer]
}

/// Build the "set emissivity" command.
pub fn cmd_set_emissivity(emissivity: Emissivity) -> CommandFrame {
    [
        LEAD,
        CLASS_EMISSIVITY,
        emissivity.hundredths(),
        EMISSIVITY_TRAILER,
    ]
}

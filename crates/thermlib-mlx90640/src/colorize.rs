//! False-color rendering of a temperature grid.
//!
//! Each pixel's temperature is normalized against the frame's own minimum and
//! maximum to an intensity in `0..=255`, then scaled independently per
//! channel by a [`ColorScalar`]. Normalization needs the global extrema, so
//! rendering takes two passes over the grid.

use thermlib_core::types::Extremum;

/// Per-channel gain applied to the normalized intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScalar {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl ColorScalar {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        ColorScalar { r, g, b }
    }

    /// Plain grayscale (all gains 1.0).
    pub const GRAY: ColorScalar = ColorScalar::new(1.0, 1.0, 1.0);
}

impl Default for ColorScalar {
    /// Red-dominant palette.
    fn default() -> Self {
        ColorScalar::new(0.8, 0.1, 0.1)
    }
}

/// Hottest and coldest pixel of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extrema {
    pub hottest: Extremum,
    pub coldest: Extremum,
}

/// Locate the hottest and coldest cell of a row-major grid `cols` wide.
///
/// Both records start at index 0 and are only replaced by a strictly
/// hotter (colder) cell, so ties resolve to the first occurrence.
pub fn find_extrema(grid: &[f32], cols: usize) -> Extrema {
    let Some(&first) = grid.first() else {
        return Extrema::default();
    };
    let cols = cols.max(1);
    let at = |index: usize, value: f32| Extremum {
        row: index / cols,
        col: index % cols,
        value,
    };

    let mut extrema = Extrema {
        hottest: at(0, first),
        coldest: at(0, first),
    };
    for (index, &value) in grid.iter().enumerate().skip(1) {
        if value > extrema.hottest.value {
            extrema.hottest = at(index, value);
        }
        if value < extrema.coldest.value {
            extrema.coldest = at(index, value);
        }
    }
    extrema
}

/// Render `grid` into `pixels` (interleaved RGB) and return its extrema.
///
/// `pixels` must hold `grid.len() * 3` bytes; any excess is left untouched.
/// A uniform grid renders as all zeros.
pub fn colorize(grid: &[f32], cols: usize, scalar: &ColorScalar, pixels: &mut [u8]) -> Extrema {
    debug_assert!(pixels.len() >= grid.len() * 3);

    let extrema = find_extrema(grid, cols);
    let min = extrema.coldest.value;
    let range = extrema.hottest.value - min;

    for (rgb, &value) in pixels.chunks_exact_mut(3).zip(grid) {
        let intensity = if range > 0.0 {
            (value - min) / range * 255.0
        } else {
            0.0
        };
        rgb[0] = channel(intensity, scalar.r);
        rgb[1] = channel(intensity, scalar.g);
        rgb[2] = channel(intensity, scalar.b);
    }
    extrema
}

fn channel(intensity: f32, gain: f32) -> u8 {
    (intensity * gain).clamp(0.0, 255.0) as u8
}

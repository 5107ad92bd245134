//! MLX90640 frame packet decoder.
//!
//! The serial module pushes one fixed-length packet per sensor frame. All
//! multi-byte fields are little-endian.
//!
//! # Packet format
//!
//! ```text
//! +--------+--------+---------------------+---------+----------+
//! | header |  size  | temperatures (N x2) | ambient | checksum |
//! +--------+--------+---------------------+---------+----------+
//!   0..2     2..4     4..4+2N               2 bytes   2 bytes
//! ```
//!
//! - header: `0x5A 0x5A`
//! - size: declared payload size, `2N + 2` (`0x0602` for the 768-pixel array)
//! - temperatures: N raw codes in hundredths of a degree, row-major
//! - ambient: raw code in hundredths of a degree
//! - checksum: carried but not verified (algorithm undocumented)
//!
//! For the 24x32 MLX90640 the packet is 1544 bytes.

use bytes::{Buf, BufMut, BytesMut};
use thermlib_core::events::DropReason;
use thermlib_core::types::SensorGeometry;
use thermlib_core::{Error, Result};

/// Two-byte packet header.
pub const HEADER: [u8; 2] = [0x5A, 0x5A];

/// Offset of the declared-size field.
pub const SIZE_OFFSET: usize = 2;

/// Offset of the first temperature code.
pub const TEMPERATURES_OFFSET: usize = 4;

/// Protocol offset between the ambient code and the correction reference,
/// in raw hundredths (8.00 degrees).
pub const AMBIENT_REFERENCE_OFFSET: f32 = 800.0;

/// Total packet length for a sensor of `geometry`.
pub const fn packet_len(geometry: SensorGeometry) -> usize {
    checksum_offset(geometry) + 2
}

/// Offset of the ambient temperature code.
pub const fn ambient_offset(geometry: SensorGeometry) -> usize {
    TEMPERATURES_OFFSET + 2 * geometry.pixel_count()
}

/// Offset of the checksum field.
pub const fn checksum_offset(geometry: SensorGeometry) -> usize {
    ambient_offset(geometry) + 2
}

/// Packet length of the 24x32 MLX90640.
pub const MLX90640_PACKET_LEN: usize = packet_len(SensorGeometry::MLX90640);

/// Scalar fields read from a packet alongside the temperature grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketFields {
    /// Declared payload size from bytes 2..4.
    pub declared_size: u16,
    /// Ambient temperature in raw hundredths of a degree.
    pub ambient: f32,
    /// Checksum field as received (not verified).
    pub checksum: u16,
}

/// A decoded and ambient-corrected packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    /// Corrected temperatures in raw hundredths, row-major.
    pub temperatures: Vec<f32>,
    pub fields: PacketFields,
    /// The uniform correction that was subtracted from every pixel.
    pub correction: f32,
}

/// Check that `buf` is exactly one packet for `geometry` with a valid header.
pub fn validate(buf: &[u8], geometry: SensorGeometry) -> std::result::Result<(), DropReason> {
    if buf.len() != packet_len(geometry) {
        return Err(DropReason::BadLength);
    }
    if buf[..2] != HEADER {
        return Err(DropReason::BadHeader);
    }
    Ok(())
}

/// Read the temperature codes of `buf` into `grid` and return the scalar
/// fields. The grid length selects the geometry; the header is not checked.
///
/// Returns [`Error::Protocol`] if `buf` is too short for `grid`.
pub fn decode_into(buf: &[u8], grid: &mut [f32]) -> Result<PacketFields> {
    let needed = TEMPERATURES_OFFSET + 2 * grid.len() + 4;
    if buf.len() < needed {
        return Err(Error::Protocol(format!(
            "packet too short: need {needed} bytes, got {}",
            buf.len()
        )));
    }

    let mut cursor = &buf[SIZE_OFFSET..];
    let declared_size = cursor.get_u16_le();
    for cell in grid.iter_mut() {
        *cell = f32::from(cursor.get_u16_le());
    }
    let ambient = f32::from(cursor.get_u16_le());
    let checksum = cursor.get_u16_le();

    Ok(PacketFields {
        declared_size,
        ambient,
        checksum,
    })
}

/// Remove the ambient-correlated bias from `grid`, in place.
///
/// The bias is the RMS deviation of all pixels from `ambient - 800` and is
/// subtracted uniformly, so differences between pixels are unchanged.
/// Returns the subtracted amount (0 for an empty grid).
pub fn correct_ambient(grid: &mut [f32], ambient: f32) -> f32 {
    if grid.is_empty() {
        return 0.0;
    }
    let reference = f64::from(ambient - AMBIENT_REFERENCE_OFFSET);
    let sum_sq: f64 = grid
        .iter()
        .map(|&v| {
            let d = f64::from(v) - reference;
            d * d
        })
        .sum();
    let delta = (sum_sq / grid.len() as f64).sqrt() as f32;
    for cell in grid.iter_mut() {
        *cell -= delta;
    }
    delta
}

/// Validate, decode and correct a packet in one call.
pub fn decode(buf: &[u8], geometry: SensorGeometry) -> Result<DecodedPacket> {
    validate(buf, geometry).map_err(|reason| {
        Error::Protocol(format!("rejected {}-byte packet: {reason}", buf.len()))
    })?;
    let mut temperatures = vec![0.0; geometry.pixel_count()];
    let fields = decode_into(buf, &mut temperatures)?;
    let correction = correct_ambient(&mut temperatures, fields.ambient);
    Ok(DecodedPacket {
        temperatures,
        fields,
        correction,
    })
}

/// Build a packet from raw codes, as the sensor module would send it.
///
/// The declared size is filled in and the checksum is left zero. Used by
/// tests and the mock stream of the test application.
///
/// The size field is 16 bits wide; for arrays above 32766 pixels it
/// saturates at `u16::MAX`.
pub fn encode_packet(geometry: SensorGeometry, codes: &[u16], ambient: u16) -> Vec<u8> {
    debug_assert_eq!(codes.len(), geometry.pixel_count());
    let declared_size = u16::try_from(2 * codes.len() + 2);
    debug_assert!(declared_size.is_ok(), "{} pixels overflow the size field", codes.len());
    let mut buf = BytesMut::with_capacity(packet_len(geometry));
    buf.put_slice(&HEADER);
    buf.put_u16_le(declared_size.unwrap_or(u16::MAX));
    for &code in codes {
        buf.put_u16_le(code);
    }
    buf.put_u16_le(ambient);
    buf.put_u16_le(0);
    buf.to_vec()
}

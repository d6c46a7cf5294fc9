//! Encoders for every [`ResponseFormat`](crate::ResponseFormat).
//!
//! These mirror what the estimation backend sends and are used by the
//! fixture backend and tests. Input is always a row-major `f32` grid.

use std::fmt;
use std::io::{Cursor, Write};

use base64::Engine as _;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use foundation::{BufferError, Channel};
use image::{ImageBuffer, ImageFormat, Luma, RgbaImage};

use crate::response::DepthResponse;

#[derive(Debug)]
pub enum EncodeError {
    Buffer(BufferError),
    Io(std::io::Error),
    Image(image::ImageError),
    Dimensions { width: u32, height: u32 },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Buffer(err) => write!(f, "invalid depth grid: {err}"),
            EncodeError::Io(err) => write!(f, "compression failed: {err}"),
            EncodeError::Image(err) => write!(f, "image encoding failed: {err}"),
            EncodeError::Dimensions { width, height } => {
                write!(f, "{width}x{height} does not fit the depth grid")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<BufferError> for EncodeError {
    fn from(err: BufferError) -> Self {
        EncodeError::Buffer(err)
    }
}

/// One byte per pixel, linearly mapped from `[min, max]` onto `[0, 255]`.
pub fn encode_normalized(
    width: u32,
    height: u32,
    depths: &[f32],
) -> Result<DepthResponse, EncodeError> {
    check_grid(width, height, depths)?;
    let (min, max) = finite_bounds(depths);
    let bytes: Vec<u8> = depths.iter().map(|d| normalize(*d, min, max)).collect();

    Ok(DepthResponse {
        width,
        height,
        depth_values: base64::engine::general_purpose::STANDARD.encode(bytes),
        depth_min: Some(min as f64),
        depth_max: Some(max as f64),
    })
}

/// Native-endian floats, zlib-compressed, then base64.
pub fn encode_compressed_float(
    width: u32,
    height: u32,
    depths: &[f32],
) -> Result<DepthResponse, EncodeError> {
    check_grid(width, height, depths)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    for d in depths {
        encoder.write_all(&d.to_ne_bytes()).map_err(EncodeError::Io)?;
    }
    let compressed = encoder.finish().map_err(EncodeError::Io)?;

    Ok(DepthResponse {
        width,
        height,
        depth_values: base64::engine::general_purpose::STANDARD.encode(compressed),
        depth_min: None,
        depth_max: None,
    })
}

/// Grayscale RGBA PNG; the normalized depth is written to R, G and B, or to
/// alpha when `channel` is [`Channel::Alpha`].
pub fn encode_image_channel(
    width: u32,
    height: u32,
    depths: &[f32],
    channel: Channel,
) -> Result<Vec<u8>, EncodeError> {
    check_grid(width, height, depths)?;
    let (min, max) = finite_bounds(depths);
    let mut data = Vec::with_capacity(depths.len() * 4);
    for d in depths {
        let v = normalize(*d, min, max);
        match channel {
            Channel::Alpha => data.extend_from_slice(&[0, 0, 0, v]),
            _ => data.extend_from_slice(&[v, v, v, 255]),
        }
    }

    let img = RgbaImage::from_raw(width, height, data)
        .ok_or(EncodeError::Dimensions { width, height })?;
    write_png(|cursor| img.write_to(cursor, ImageFormat::Png))
}

/// 16-bit grayscale PNG storing `round(depth * scale)`, clamped to `u16`.
pub fn encode_luma16(
    width: u32,
    height: u32,
    depths: &[f32],
    scale: f32,
) -> Result<Vec<u8>, EncodeError> {
    check_grid(width, height, depths)?;
    let words: Vec<u16> = depths
        .iter()
        .map(|d| {
            let v = if d.is_finite() { *d * scale } else { 0.0 };
            v.round().clamp(0.0, u16::MAX as f32) as u16
        })
        .collect();

    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, words)
        .ok_or(EncodeError::Dimensions { width, height })?;
    write_png(|cursor| img.write_to(cursor, ImageFormat::Png))
}

fn write_png(
    write: impl FnOnce(&mut Cursor<&mut Vec<u8>>) -> image::ImageResult<()>,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    write(&mut Cursor::new(&mut out)).map_err(EncodeError::Image)?;
    Ok(out)
}

fn check_grid(width: u32, height: u32, depths: &[f32]) -> Result<(), BufferError> {
    if width == 0 || height == 0 {
        return Err(BufferError::ZeroSized { width, height });
    }
    let expected = width as usize * height as usize;
    if depths.len() != expected {
        return Err(BufferError::LengthMismatch {
            expected,
            actual: depths.len(),
        });
    }
    Ok(())
}

fn finite_bounds(depths: &[f32]) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for d in depths.iter().filter(|d| d.is_finite()) {
        lo = lo.min(*d);
        hi = hi.max(*d);
    }
    if lo > hi { (0.0, 0.0) } else { (lo, hi) }
}

// A flat grid maps to 0 everywhere rather than dividing by zero.
fn normalize(d: f32, min: f32, max: f32) -> u8 {
    let span = max - min;
    if !d.is_finite() || span <= 0.0 {
        return 0;
    }
    ((d - min) / span * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_spans_full_byte_range() {
        let resp = encode_normalized(3, 1, &[2.0, 4.0, 6.0]).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&resp.depth_values)
            .unwrap();
        assert_eq!(bytes, vec![0, 128, 255]);
        assert_eq!(resp.depth_min, Some(2.0));
        assert_eq!(resp.depth_max, Some(6.0));
    }

    #[test]
    fn flat_grid_does_not_divide_by_zero() {
        let resp = encode_normalized(2, 1, &[3.0, 3.0]).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&resp.depth_values)
            .unwrap();
        assert_eq!(bytes, vec![0, 0]);
    }

    #[test]
    fn grid_length_is_checked() {
        let err = encode_compressed_float(2, 2, &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Buffer(BufferError::LengthMismatch {
                expected: 4,
                actual: 1
            })
        ));
    }

    #[test]
    fn png_encoders_emit_png_signature() {
        let png = encode_image_channel(1, 1, &[0.0], Channel::Red).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let png = encode_luma16(1, 1, &[1.0], 256.0).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }
}

use std::fmt;
use std::io::Read;

use base64::Engine as _;
use flate2::read::{GzDecoder, ZlibDecoder};
use foundation::{BufferError, Channel, DepthBuffer, DepthSamples, ValueRange};

use crate::response::{DepthResponse, ResponseFormat};

pub const DEFAULT_LUMA16_SCALE: f32 = 256.0;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Json(String),
    Base64(String),
    Decompress(String),
    Image(String),
    InvalidRange { min: f64, max: f64 },
    LengthMismatch { expected: usize, actual: usize },
    Buffer(BufferError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(msg) => write!(f, "malformed depth response: {msg}"),
            DecodeError::Base64(msg) => write!(f, "malformed base64 depth values: {msg}"),
            DecodeError::Decompress(msg) => write!(f, "depth values failed to decompress: {msg}"),
            DecodeError::Image(msg) => write!(f, "depth image failed to decode: {msg}"),
            DecodeError::InvalidRange { min, max } => {
                write!(f, "depth range must be finite, got [{min}, {max}]")
            }
            DecodeError::LengthMismatch { expected, actual } => {
                write!(f, "depth values have {actual} bytes, expected {expected}")
            }
            DecodeError::Buffer(err) => write!(f, "inconsistent depth buffer: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<BufferError> for DecodeError {
    fn from(err: BufferError) -> Self {
        DecodeError::Buffer(err)
    }
}

/// Turns one raw response body into a [`DepthBuffer`].
///
/// Implementations never return a partially filled buffer: every failure is a
/// [`DecodeError`].
pub trait DepthDecoder {
    fn decode(&self, body: &[u8]) -> Result<DepthBuffer, DecodeError>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DecoderOptions {
    pub channel: Channel,
    pub luma16_scale: f32,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            channel: Channel::Red,
            luma16_scale: DEFAULT_LUMA16_SCALE,
        }
    }
}

impl ResponseFormat {
    pub fn decoder(self, opts: DecoderOptions) -> Box<dyn DepthDecoder> {
        match self {
            ResponseFormat::ImageChannel => Box::new(ImageChannelDecoder {
                channel: opts.channel,
            }),
            ResponseFormat::CompressedFloat => Box::new(CompressedFloatDecoder),
            ResponseFormat::NormalizedByte => Box::new(NormalizedByteDecoder),
            ResponseFormat::Luma16 => Box::new(Luma16Decoder {
                scale: opts.luma16_scale,
            }),
        }
    }

    pub fn decode(self, opts: DecoderOptions, body: &[u8]) -> Result<DepthBuffer, DecodeError> {
        self.decoder(opts).decode(body)
    }
}

/// PNG body read back as RGBA; depth lives in `channel`.
#[derive(Debug, Copy, Clone, Default)]
pub struct ImageChannelDecoder {
    pub channel: Channel,
}

impl DepthDecoder for ImageChannelDecoder {
    fn decode(&self, body: &[u8]) -> Result<DepthBuffer, DecodeError> {
        let img = image::load_from_memory(body).map_err(|e| DecodeError::Image(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let buffer = DepthBuffer::new(
            width,
            height,
            DepthSamples::Rgba8 {
                data: rgba.into_raw(),
                channel: self.channel,
            },
        )?;
        Ok(buffer)
    }
}

/// PNG body read back as 16-bit grayscale.
#[derive(Debug, Copy, Clone)]
pub struct Luma16Decoder {
    pub scale: f32,
}

impl DepthDecoder for Luma16Decoder {
    fn decode(&self, body: &[u8]) -> Result<DepthBuffer, DecodeError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(DecodeError::InvalidRange {
                min: 0.0,
                max: self.scale as f64,
            });
        }
        let img = image::load_from_memory(body).map_err(|e| DecodeError::Image(e.to_string()))?;
        let luma = img.to_luma16();
        let (width, height) = luma.dimensions();
        let buffer = DepthBuffer::new(
            width,
            height,
            DepthSamples::Luma16 {
                data: luma.into_raw(),
                scale: self.scale,
            },
        )?;
        Ok(buffer)
    }
}

/// JSON body; `depth_values` is base64 of a zlib (or gzip) stream of
/// native-endian `f32`s.
#[derive(Debug, Copy, Clone, Default)]
pub struct CompressedFloatDecoder;

impl DepthDecoder for CompressedFloatDecoder {
    fn decode(&self, body: &[u8]) -> Result<DepthBuffer, DecodeError> {
        let resp = parse_response(body)?;
        let compressed = decode_base64(&resp.depth_values)?;
        let expected = expected_len(resp.width, resp.height, 4);
        let bytes = inflate(&compressed, expected)?;

        if bytes.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let floats = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word.copy_from_slice(chunk);
                f32::from_ne_bytes(word)
            })
            .collect();
        let buffer = DepthBuffer::new(resp.width, resp.height, DepthSamples::Float32(floats))?;
        Ok(buffer)
    }
}

/// JSON body; `depth_values` is base64 of one byte per pixel, mapped onto
/// `[depth_min, depth_max]`.
#[derive(Debug, Copy, Clone, Default)]
pub struct NormalizedByteDecoder;

impl DepthDecoder for NormalizedByteDecoder {
    fn decode(&self, body: &[u8]) -> Result<DepthBuffer, DecodeError> {
        let resp = parse_response(body)?;
        let range = match (resp.depth_min, resp.depth_max) {
            (Some(min), Some(max)) => {
                if !(min.is_finite() && max.is_finite()) {
                    return Err(DecodeError::InvalidRange { min, max });
                }
                Some(ValueRange::new(min as f32, max as f32))
            }
            _ => None,
        };

        let data = decode_base64(&resp.depth_values)?;
        let expected = expected_len(resp.width, resp.height, 1);
        if data.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        let buffer = DepthBuffer::new(
            resp.width,
            resp.height,
            DepthSamples::Normalized8 { data, range },
        )?;
        Ok(buffer)
    }
}

fn parse_response(body: &[u8]) -> Result<DepthResponse, DecodeError> {
    serde_json::from_slice(body).map_err(|e| DecodeError::Json(e.to_string()))
}

fn decode_base64(value: &str) -> Result<Vec<u8>, DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

/// Inflates at most `limit + 1` bytes, so an oversized stream shows up as a
/// length mismatch without being fully expanded.
fn inflate(compressed: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let cap = (limit as u64).saturating_add(1);
    let mut out = Vec::with_capacity(limit.min(1 << 20));
    let result = if compressed.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(compressed).take(cap).read_to_end(&mut out)
    } else {
        ZlibDecoder::new(compressed).take(cap).read_to_end(&mut out)
    };
    result.map_err(|e| DecodeError::Decompress(e.to_string()))?;
    Ok(out)
}

fn expected_len(width: u32, height: u32, bytes_per_pixel: usize) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(bytes_per_pixel)
}

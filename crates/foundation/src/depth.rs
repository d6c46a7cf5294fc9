/// Linear range used to recover physical depth from normalized bytes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Maps a byte in `0..=255` back onto `[min, max]`.
    pub fn rescale(&self, byte: u8) -> f32 {
        (byte as f32 / 255.0) * (self.max - self.min) + self.min
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 255.0,
        }
    }
}

/// Which of the four interleaved RGBA channels carries depth.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Channel {
    #[default]
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub fn offset(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
            Channel::Alpha => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::Alpha => "alpha",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "r" | "red" => Some(Channel::Red),
            "g" | "green" => Some(Channel::Green),
            "b" | "blue" => Some(Channel::Blue),
            "a" | "alpha" => Some(Channel::Alpha),
            _ => None,
        }
    }
}

/// Sample storage, one variant per transport encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum DepthSamples {
    /// Four bytes per pixel; only `channel` carries signal.
    Rgba8 { data: Vec<u8>, channel: Channel },
    /// One native float per pixel, already in physical units.
    Float32(Vec<f32>),
    /// One byte per pixel, mapped onto `range` at query time.
    Normalized8 {
        data: Vec<u8>,
        range: Option<ValueRange>,
    },
    /// One 16-bit word per pixel; `depth = word / scale`.
    Luma16 { data: Vec<u16>, scale: f32 },
}

impl DepthSamples {
    /// Number of stored elements per pixel.
    pub fn stride(&self) -> usize {
        match self {
            DepthSamples::Rgba8 { .. } => 4,
            _ => 1,
        }
    }

    /// Number of stored elements.
    pub fn stored_len(&self) -> usize {
        match self {
            DepthSamples::Rgba8 { data, .. } => data.len(),
            DepthSamples::Float32(data) => data.len(),
            DepthSamples::Normalized8 { data, .. } => data.len(),
            DepthSamples::Luma16 { data, .. } => data.len(),
        }
    }

    fn channel_offset(&self) -> usize {
        match self {
            DepthSamples::Rgba8 { channel, .. } => channel.offset(),
            _ => 0,
        }
    }

    fn raw_at(&self, index: usize) -> Option<f32> {
        match self {
            DepthSamples::Rgba8 { data, .. } => data.get(index).map(|v| *v as f32),
            DepthSamples::Float32(data) => data.get(index).copied(),
            DepthSamples::Normalized8 { data, .. } => data.get(index).map(|v| *v as f32),
            DepthSamples::Luma16 { data, .. } => data.get(index).map(|v| *v as f32),
        }
    }

    fn depth_at(&self, index: usize) -> Option<f32> {
        match self {
            DepthSamples::Normalized8 { data, range } => {
                let range = range.unwrap_or_default();
                data.get(index).map(|v| range.rescale(*v))
            }
            DepthSamples::Luma16 { data, scale } => data.get(index).map(|v| *v as f32 / *scale),
            _ => self.raw_at(index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    ZeroSized { width: u32, height: u32 },
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::ZeroSized { width, height } => {
                write!(f, "depth buffer must be non-empty, got {width}x{height}")
            }
            BufferError::LengthMismatch { expected, actual } => {
                write!(f, "expected {expected} samples, got {actual}")
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Immutable 2D depth grid decoded from one backend response.
///
/// Invariants, checked by [`DepthBuffer::new`]:
/// - `width > 0` and `height > 0`.
/// - stored length is `width * height * stride`.
///
/// Every in-bounds `(x, y)` therefore resolves to a stored sample.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    samples: DepthSamples,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32, samples: DepthSamples) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroSized { width, height });
        }
        let expected = pixel_count(width, height) * samples.stride();
        let actual = samples.stored_len();
        if expected != actual {
            return Err(BufferError::LengthMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (not stored elements).
    pub fn len(&self) -> usize {
        pixel_count(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stride(&self) -> usize {
        self.samples.stride()
    }

    pub fn samples(&self) -> &DepthSamples {
        &self.samples
    }

    pub fn value_range(&self) -> Option<ValueRange> {
        match &self.samples {
            DepthSamples::Normalized8 { range, .. } => Some(range.unwrap_or_default()),
            _ => None,
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Index of the stored element carrying depth for pixel `(x, y)`.
    pub fn index(&self, x: u32, y: u32) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        let pixel = grid_index(x, y, self.width);
        Some(pixel * self.stride() + self.samples.channel_offset())
    }

    /// Stored value at `(x, y)` without range rescaling.
    pub fn raw(&self, x: u32, y: u32) -> Option<f32> {
        self.index(x, y).and_then(|i| self.samples.raw_at(i))
    }

    /// Physical depth at `(x, y)`.
    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        self.index(x, y).and_then(|i| self.samples.depth_at(i))
    }

    /// Physical depths in row-major order.
    pub fn depths(&self) -> impl Iterator<Item = f32> + '_ {
        let stride = self.stride();
        let offset = self.samples.channel_offset();
        (0..self.len()).filter_map(move |pixel| self.samples.depth_at(pixel * stride + offset))
    }

    /// Finite minimum and maximum physical depth, if any sample is finite.
    pub fn depth_bounds(&self) -> Option<(f32, f32)> {
        self.depths()
            .filter(|d| d.is_finite())
            .fold(None, |acc, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}

/// Row-major pixel index: `y * width + x`.
pub fn grid_index(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(width: u32, height: u32) -> DepthBuffer {
        let data = (0..width * height)
            .flat_map(|i| [i as u8, 200, 100, 255])
            .collect();
        DepthBuffer::new(
            width,
            height,
            DepthSamples::Rgba8 {
                data,
                channel: Channel::Red,
            },
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = DepthBuffer::new(0, 3, DepthSamples::Float32(Vec::new())).unwrap_err();
        assert_eq!(
            err,
            BufferError::ZeroSized {
                width: 0,
                height: 3
            }
        );
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = DepthBuffer::new(2, 2, DepthSamples::Float32(vec![0.0; 3])).unwrap_err();
        assert_eq!(
            err,
            BufferError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );

        // RGBA storage needs four bytes per pixel.
        let err = DepthBuffer::new(
            2,
            1,
            DepthSamples::Rgba8 {
                data: vec![0; 2],
                channel: Channel::Red,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            BufferError::LengthMismatch {
                expected: 8,
                actual: 2
            }
        );
    }

    #[test]
    fn index_is_row_major_for_every_in_bounds_pixel() {
        let width = 7;
        let height = 5;
        let buffer = DepthBuffer::new(
            width,
            height,
            DepthSamples::Float32((0..width * height).map(|i| i as f32).collect()),
        )
        .unwrap();

        for y in 0..height {
            for x in 0..width {
                let index = buffer.index(x, y).unwrap();
                assert_eq!(index, (y * width + x) as usize);
                assert!(index < buffer.samples().stored_len());
                assert_eq!(buffer.depth(x, y), Some(index as f32));
            }
        }
        assert_eq!(buffer.index(width, 0), None);
        assert_eq!(buffer.index(0, height), None);
    }

    #[test]
    fn rgba_index_scales_by_stride_and_channel() {
        let buffer = rgba(3, 2);
        assert_eq!(buffer.index(1, 1), Some(16));
        assert_eq!(buffer.raw(1, 1), Some(4.0));

        for y in 0..2 {
            for x in 0..3 {
                assert!(buffer.index(x, y).unwrap() < buffer.samples().stored_len());
            }
        }

        let green = DepthBuffer::new(
            1,
            1,
            DepthSamples::Rgba8 {
                data: vec![1, 2, 3, 4],
                channel: Channel::Green,
            },
        )
        .unwrap();
        assert_eq!(green.index(0, 0), Some(1));
        assert_eq!(green.raw(0, 0), Some(2.0));
    }

    #[test]
    fn normalized_bytes_rescale_through_range() {
        let buffer = DepthBuffer::new(
            2,
            1,
            DepthSamples::Normalized8 {
                data: vec![128, 255],
                range: Some(ValueRange::new(0.0, 10.0)),
            },
        )
        .unwrap();

        assert_eq!(buffer.raw(0, 0), Some(128.0));
        let d = buffer.depth(0, 0).unwrap();
        assert!((d - 5.0196).abs() < 1e-3, "got {d}");
        assert_eq!(buffer.depth(1, 0), Some(10.0));
    }

    #[test]
    fn missing_range_defaults_to_byte_scale() {
        let buffer = DepthBuffer::new(
            1,
            1,
            DepthSamples::Normalized8 {
                data: vec![77],
                range: None,
            },
        )
        .unwrap();
        assert_eq!(buffer.value_range(), Some(ValueRange::default()));
        let d = buffer.depth(0, 0).unwrap();
        assert!((d - 77.0).abs() < 1e-4, "got {d}");
    }

    #[test]
    fn luma16_divides_by_scale() {
        let buffer = DepthBuffer::new(
            2,
            1,
            DepthSamples::Luma16 {
                data: vec![512, 256 * 3 + 128],
                scale: 256.0,
            },
        )
        .unwrap();
        assert_eq!(buffer.raw(0, 0), Some(512.0));
        assert_eq!(buffer.depth(0, 0), Some(2.0));
        assert_eq!(buffer.depth(1, 0), Some(3.5));
    }

    #[test]
    fn depth_bounds_skip_non_finite() {
        let buffer = DepthBuffer::new(
            2,
            2,
            DepthSamples::Float32(vec![3.0, f32::NAN, -1.0, 8.5]),
        )
        .unwrap();
        assert_eq!(buffer.depth_bounds(), Some((-1.0, 8.5)));
        assert_eq!(buffer.depths().count(), 4);
    }

    #[test]
    fn depths_follow_selected_channel() {
        let buffer = rgba(2, 2);
        let depths: Vec<f32> = buffer.depths().collect();
        assert_eq!(depths, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn channel_parse_accepts_short_and_long_names() {
        assert_eq!(Channel::parse("R"), Some(Channel::Red));
        assert_eq!(Channel::parse("alpha"), Some(Channel::Alpha));
        assert_eq!(Channel::parse("cyan"), None);
    }
}

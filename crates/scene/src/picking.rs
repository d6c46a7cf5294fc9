use foundation::{DepthBuffer, DepthSamples};
use serde::{Deserialize, Serialize};

/// Pointer position relative to the displayed element's top-left corner, in
/// CSS pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

impl Pointer {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of the element showing the depth map.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn of_buffer(buffer: &DepthBuffer) -> Self {
        Self::new(buffer.width() as f64, buffer.height() as f64)
    }

    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// How pointer coordinates relate to buffer coordinates.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePolicy {
    /// The surface is sized to the buffer; pointer pixels are buffer pixels.
    Native,
    /// The surface may be scaled; pointer pixels are rescaled to the buffer.
    #[default]
    Scaled,
}

/// Whether a sample is a raw channel intensity or a physical depth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleKind {
    Channel,
    Physical,
}

/// Result of one pointer-move event. Never stored between events.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CursorSample {
    pub pointer: Pointer,
    pub buffer_x: u32,
    pub buffer_y: u32,
    pub index: usize,
    pub raw: f32,
    pub depth: f32,
    pub kind: SampleKind,
}

/// Maps a pointer onto buffer coordinates.
///
/// `Scaled` computes `floor(pointer / display * buffer)` per axis. Results
/// outside `[0, width) x [0, height)` are rejected, not clamped; so are
/// non-finite pointers and degenerate displays.
pub fn buffer_coords(
    pointer: Pointer,
    display: DisplaySize,
    width: u32,
    height: u32,
    policy: SamplePolicy,
) -> Option<(u32, u32)> {
    if !(pointer.x.is_finite() && pointer.y.is_finite()) {
        return None;
    }

    let (bx, by) = match policy {
        SamplePolicy::Native => (pointer.x.floor(), pointer.y.floor()),
        SamplePolicy::Scaled => {
            if !display.is_drawable() {
                return None;
            }
            (
                (pointer.x / display.width * width as f64).floor(),
                (pointer.y / display.height * height as f64).floor(),
            )
        }
    };

    if bx < 0.0 || by < 0.0 || bx >= width as f64 || by >= height as f64 {
        return None;
    }
    Some((bx as u32, by as u32))
}

/// Samples `buffer` under `pointer`. Pure: no state is read or written.
pub fn sample_at(
    buffer: &DepthBuffer,
    pointer: Pointer,
    display: DisplaySize,
    policy: SamplePolicy,
) -> Option<CursorSample> {
    let (x, y) = buffer_coords(pointer, display, buffer.width(), buffer.height(), policy)?;
    let kind = match buffer.samples() {
        DepthSamples::Rgba8 { .. } => SampleKind::Channel,
        _ => SampleKind::Physical,
    };
    Some(CursorSample {
        pointer,
        buffer_x: x,
        buffer_y: y,
        index: buffer.index(x, y)?,
        raw: buffer.raw(x, y)?,
        depth: buffer.depth(x, y)?,
        kind,
    })
}

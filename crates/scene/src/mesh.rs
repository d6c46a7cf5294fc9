use std::fmt::Write as _;

use foundation::DepthBuffer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOptions {
    /// World-space width of the grid; depth along z keeps the image aspect.
    pub extent: f32,
    /// Height of the tallest vertex (normalized) or units per depth unit.
    pub elevation_scale: f32,
    /// Rescale depths to `[0, 1]` before applying `elevation_scale`.
    pub normalize: bool,
    /// Raise near points instead of far ones.
    pub invert: bool,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            extent: 2.0,
            elevation_scale: 0.4,
            normalize: true,
            invert: false,
        }
    }
}

/// Grid mesh with one vertex per depth sample, y-up.
///
/// Vertices are row-major like the buffer; `lines` holds vertex index pairs
/// for the wireframe (every horizontal and vertical grid edge).
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMesh {
    pub columns: u32,
    pub rows: u32,
    pub positions: Vec<[f32; 3]>,
    pub lines: Vec<u32>,
}

impl HeightMesh {
    pub fn from_buffer(buffer: &DepthBuffer, opts: &MeshOptions) -> Self {
        let columns = buffer.width();
        let rows = buffer.height();

        let width = opts.extent;
        let depth = opts.extent * rows as f32 / columns as f32;
        let step_x = if columns > 1 { width / (columns - 1) as f32 } else { 0.0 };
        let step_z = if rows > 1 { depth / (rows - 1) as f32 } else { 0.0 };
        let half_x = step_x * columns.saturating_sub(1) as f32 * 0.5;
        let half_z = step_z * rows.saturating_sub(1) as f32 * 0.5;

        let bounds = buffer.depth_bounds().unwrap_or((0.0, 0.0));
        let elevation = |d: f32| -> f32 {
            if !d.is_finite() {
                return 0.0;
            }
            let mut h = if opts.normalize {
                let span = bounds.1 - bounds.0;
                if span > 0.0 { (d - bounds.0) / span } else { 0.0 }
            } else {
                d
            };
            if opts.invert {
                h = if opts.normalize { 1.0 - h } else { -h };
            }
            h * opts.elevation_scale
        };

        let mut positions = Vec::with_capacity(buffer.len());
        for (i, d) in buffer.depths().enumerate() {
            let col = (i % columns as usize) as f32;
            let row = (i / columns as usize) as f32;
            positions.push([
                col * step_x - half_x,
                elevation(d),
                row * step_z - half_z,
            ]);
        }

        Self {
            columns,
            rows,
            positions,
            lines: grid_lines(columns, rows),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn segment_count(&self) -> usize {
        self.lines.len() / 2
    }

    /// Wavefront OBJ with `v` records and `l` (polyline) elements.
    pub fn to_obj(&self) -> String {
        let mut out = String::with_capacity(self.positions.len() * 32);
        let _ = writeln!(out, "# depth mesh {}x{}", self.columns, self.rows);
        for [x, y, z] in &self.positions {
            let _ = writeln!(out, "v {x} {y} {z}");
        }
        for pair in self.lines.chunks_exact(2) {
            // OBJ indices are 1-based.
            let _ = writeln!(out, "l {} {}", pair[0] + 1, pair[1] + 1);
        }
        out
    }
}

fn grid_lines(columns: u32, rows: u32) -> Vec<u32> {
    let horizontal = (columns.saturating_sub(1) as usize) * rows as usize;
    let vertical = columns as usize * (rows.saturating_sub(1) as usize);
    let mut lines = Vec::with_capacity((horizontal + vertical) * 2);
    for row in 0..rows {
        for col in 0..columns {
            let i = row * columns + col;
            if col + 1 < columns {
                lines.extend_from_slice(&[i, i + 1]);
            }
            if row + 1 < rows {
                lines.extend_from_slice(&[i, i + columns]);
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::DepthSamples;

    fn floats(width: u32, height: u32, values: Vec<f32>) -> DepthBuffer {
        DepthBuffer::new(width, height, DepthSamples::Float32(values)).unwrap()
    }

    #[test]
    fn one_vertex_per_sample_with_elevation_from_depth() {
        let buffer = floats(3, 2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
        let mesh = HeightMesh::from_buffer(&buffer, &MeshOptions::default());

        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.positions[0][1], 0.0);
        assert_eq!(mesh.positions[5][1], 0.4);
        assert!((mesh.positions[2][1] - 0.2).abs() < 1e-6);

        // x spans the extent, z keeps the aspect ratio.
        assert_eq!(mesh.positions[0][0], -1.0);
        assert_eq!(mesh.positions[2][0], 1.0);
        assert!((mesh.positions[0][2] + 2.0 / 3.0).abs() < 1e-6);
        assert!((mesh.positions[3][2] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn wireframe_connects_grid_neighbours() {
        let buffer = floats(3, 2, vec![0.0; 6]);
        let mesh = HeightMesh::from_buffer(&buffer, &MeshOptions::default());
        // 2 rows * 2 horizontal + 3 columns * 1 vertical.
        assert_eq!(mesh.segment_count(), 7);
        assert_eq!(&mesh.lines[..4], &[0, 1, 0, 3]);
        assert!(mesh.lines.iter().all(|i| (*i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn raw_and_inverted_elevations() {
        let buffer = floats(2, 1, vec![2.0, 6.0]);
        let raw = HeightMesh::from_buffer(
            &buffer,
            &MeshOptions {
                normalize: false,
                elevation_scale: 0.5,
                ..MeshOptions::default()
            },
        );
        assert_eq!(raw.positions[1][1], 3.0);

        let inverted = HeightMesh::from_buffer(
            &buffer,
            &MeshOptions {
                invert: true,
                elevation_scale: 1.0,
                ..MeshOptions::default()
            },
        );
        assert_eq!(inverted.positions[0][1], 1.0);
        assert_eq!(inverted.positions[1][1], 0.0);
    }

    #[test]
    fn single_pixel_and_non_finite_depths_stay_flat() {
        let one = HeightMesh::from_buffer(&floats(1, 1, vec![9.0]), &MeshOptions::default());
        assert_eq!(one.positions, vec![[0.0, 0.0, 0.0]]);
        assert!(one.lines.is_empty());

        let nan = HeightMesh::from_buffer(
            &floats(2, 1, vec![f32::NAN, 1.0]),
            &MeshOptions::default(),
        );
        assert_eq!(nan.positions[0][1], 0.0);
    }

    #[test]
    fn obj_export_uses_one_based_indices() {
        let mesh = HeightMesh::from_buffer(&floats(2, 1, vec![0.0, 1.0]), &MeshOptions::default());
        let obj = mesh.to_obj();
        assert!(obj.starts_with("# depth mesh 2x1\n"));
        assert!(obj.contains("\nv -1 0 0\n"));
        assert!(obj.ends_with("l 1 2\n"));
    }
}

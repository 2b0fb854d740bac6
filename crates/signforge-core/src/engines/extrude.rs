//! Built-in extrusion: occupancy lattice to closed prisms.

use std::collections::HashMap;

use async_trait::async_trait;

use signforge_critics::{Mesh, VectorImage};

use super::{EngineError, ExtrusionEngine};
use crate::config::{BuildVolume, ExtrudeConfig};

/// Extrusion depth bounds in millimeters.
const MIN_DEPTH_MM: f32 = 2.0;
const MAX_DEPTH_MM: f32 = 10.0;

/// Samples the vector foreground onto a square occupancy lattice and emits
/// one closed prism per 4-connected component.
///
/// Diagonal pinch corners are filled before meshing: two cells touching only
/// at a corner would put four walls on one vertical edge, which breaks the
/// manifold invariant the mesh checkpoint enforces. With pinches gone the
/// per-cell quads pair up edge for edge, so the output is watertight and
/// manifold by construction.
pub struct LatticeExtruder;

#[async_trait]
impl ExtrusionEngine for LatticeExtruder {
    async fn extrude(
        &self,
        vector: &VectorImage,
        params: &ExtrudeConfig,
        build_volume: &BuildVolume,
    ) -> Result<Mesh, EngineError> {
        self.build(vector, params, build_volume)
    }
}

impl LatticeExtruder {
    fn build(
        &self,
        vector: &VectorImage,
        params: &ExtrudeConfig,
        build_volume: &BuildVolume,
    ) -> Result<Mesh, EngineError> {
        let (width, height) = (vector.width, vector.height);
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidInput("vector canvas is empty".into()));
        }

        // Canvas foreground bitmap from the region spans.
        let mut foreground = vec![false; (width as usize) * (height as usize)];
        for region in &vector.regions {
            for span in &region.spans {
                if span.y >= height {
                    continue;
                }
                let x1 = span.x1.min(width);
                for x in span.x0..x1 {
                    foreground[(span.y * width + x) as usize] = true;
                }
            }
        }

        // Center-sample the bitmap onto the lattice.
        let n = params.lattice_resolution;
        let mut grid = vec![false; (n as usize) * (n as usize)];
        for gy in 0..n {
            let py = (((gy as f32 + 0.5) * height as f32 / n as f32) as u32).min(height - 1);
            for gx in 0..n {
                let px = (((gx as f32 + 0.5) * width as f32 / n as f32) as u32).min(width - 1);
                grid[(gy * n + gx) as usize] = foreground[(py * width + px) as usize];
            }
        }
        if !grid.iter().any(|&cell| cell) {
            return Err(EngineError::InvalidInput(
                "no foreground sampled onto the lattice".into(),
            ));
        }

        pinch_fill(&mut grid, n);

        let depth = params.depth_mm.clamp(MIN_DEPTH_MM, MAX_DEPTH_MM);
        let cell_w = params.target_width_mm / n as f32;
        let cell_h = (params.target_width_mm * height as f32 / width as f32) / n as f32;

        let components = lattice_components(&grid, n);
        let mut vertices: Vec<[f32; 3]> = Vec::new();
        let mut faces: Vec<[u32; 3]> = Vec::new();

        for cells in &components {
            let mut pool = VertexPool {
                vertices: &mut vertices,
                index: HashMap::new(),
                cell_w,
                cell_h,
                depth,
                n,
            };
            for &(cx, cy) in cells {
                emit_cell(&mut pool, &mut faces, &grid, n, cx, cy);
            }
        }

        if faces.len() > params.max_faces {
            return Err(EngineError::Failed(format!(
                "face budget exceeded: {} faces, cap is {}",
                faces.len(),
                params.max_faces
            )));
        }
        if faces.len() > params.warn_faces {
            tracing::warn!(
                faces = faces.len(),
                warn_at = params.warn_faces,
                "extrusion is unusually dense"
            );
        }

        recenter(&mut vertices);

        let mesh = Mesh::new(vertices, faces);
        let dims = mesh.dimensions();
        let [vx, vy, vz] = build_volume.as_mm();
        if dims[0] > vx || dims[1] > vy || dims[2] > vz {
            tracing::warn!(
                x = dims[0],
                y = dims[1],
                z = dims[2],
                "extruded footprint exceeds the build volume"
            );
        }
        tracing::debug!(
            components = components.len(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "extrusion complete"
        );
        Ok(mesh)
    }
}

/// Fill the empty diagonal of every checkerboard 2x2 block, repeating until
/// no block matches.
fn pinch_fill(grid: &mut [bool], n: u32) {
    let idx = |x: u32, y: u32| (y * n + x) as usize;
    let mut changed = true;
    while changed {
        changed = false;
        for y in 0..n.saturating_sub(1) {
            for x in 0..n.saturating_sub(1) {
                let a = grid[idx(x, y)];
                let b = grid[idx(x + 1, y)];
                let c = grid[idx(x, y + 1)];
                let d = grid[idx(x + 1, y + 1)];
                if a && d && !b && !c {
                    grid[idx(x + 1, y)] = true;
                    changed = true;
                } else if b && c && !a && !d {
                    grid[idx(x, y)] = true;
                    changed = true;
                }
            }
        }
    }
}

/// 4-connected occupied components, cells in deterministic scan order.
fn lattice_components(grid: &[bool], n: u32) -> Vec<Vec<(u32, u32)>> {
    let idx = |x: u32, y: u32| (y * n + x) as usize;
    let mut seen = vec![false; grid.len()];
    let mut components = Vec::new();
    for y in 0..n {
        for x in 0..n {
            if !grid[idx(x, y)] || seen[idx(x, y)] {
                continue;
            }
            let mut cells = Vec::new();
            let mut stack = vec![(x, y)];
            seen[idx(x, y)] = true;
            while let Some((cx, cy)) = stack.pop() {
                cells.push((cx, cy));
                let neighbors = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < n && ny < n && grid[idx(nx, ny)] && !seen[idx(nx, ny)] {
                        seen[idx(nx, ny)] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            components.push(cells);
        }
    }
    components
}

/// Welds lattice corners to vertex indices within one component.
///
/// Canvas y grows downward; mesh y is flipped so the sign reads correctly
/// seen from +z. Bottom rests on z = 0.
struct VertexPool<'a> {
    vertices: &'a mut Vec<[f32; 3]>,
    index: HashMap<(u32, u32, bool), u32>,
    cell_w: f32,
    cell_h: f32,
    depth: f32,
    n: u32,
}

impl VertexPool<'_> {
    fn get(&mut self, cx: u32, cy: u32, top: bool) -> u32 {
        if let Some(&i) = self.index.get(&(cx, cy, top)) {
            return i;
        }
        let x = cx as f32 * self.cell_w;
        let y = (self.n - cy) as f32 * self.cell_h;
        let z = if top { self.depth } else { 0.0 };
        let i = self.vertices.len() as u32;
        self.vertices.push([x, y, z]);
        self.index.insert((cx, cy, top), i);
        i
    }
}

/// Emit top, bottom, and exposed walls for one occupied cell.
///
/// Corner naming in mesh space: c00 low-x/low-y, c10 high-x/low-y, c11
/// high-x/high-y, c01 low-x/high-y. All quads wind counter-clockwise seen
/// from outside, so shared edges pair in opposite directions.
fn emit_cell(
    pool: &mut VertexPool<'_>,
    faces: &mut Vec<[u32; 3]>,
    grid: &[bool],
    n: u32,
    cx: u32,
    cy: u32,
) {
    let occupied = |x: u32, y: u32| x < n && y < n && grid[(y * n + x) as usize];

    let c00b = pool.get(cx, cy + 1, false);
    let c10b = pool.get(cx + 1, cy + 1, false);
    let c11b = pool.get(cx + 1, cy, false);
    let c01b = pool.get(cx, cy, false);
    let c00t = pool.get(cx, cy + 1, true);
    let c10t = pool.get(cx + 1, cy + 1, true);
    let c11t = pool.get(cx + 1, cy, true);
    let c01t = pool.get(cx, cy, true);

    // Top (+z) and bottom (-z).
    faces.push([c00t, c10t, c11t]);
    faces.push([c00t, c11t, c01t]);
    faces.push([c00b, c11b, c10b]);
    faces.push([c00b, c01b, c11b]);

    let mut quad = |p0: u32, p1: u32, p2: u32, p3: u32| {
        faces.push([p0, p1, p2]);
        faces.push([p0, p2, p3]);
    };

    // Walls on sides with no occupied neighbor; the bounds check in
    // `occupied` covers the lattice rim.
    if !occupied(cx, cy.wrapping_sub(1)) {
        quad(c11b, c01b, c01t, c11t); // +y
    }
    if !occupied(cx, cy + 1) {
        quad(c00b, c10b, c10t, c00t); // -y
    }
    if !occupied(cx.wrapping_sub(1), cy) {
        quad(c01b, c00b, c00t, c01t); // -x
    }
    if !occupied(cx + 1, cy) {
        quad(c10b, c11b, c11t, c10t); // +x
    }
}

/// Translate so the footprint is centered on the build-plate origin.
fn recenter(vertices: &mut [[f32; 3]]) {
    if vertices.is_empty() {
        return;
    }
    let mut min = [f32::INFINITY; 2];
    let mut max = [f32::NEG_INFINITY; 2];
    for v in vertices.iter() {
        for axis in 0..2 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    let shift = [(min[0] + max[0]) / 2.0, (min[1] + max[1]) / 2.0];
    for v in vertices.iter_mut() {
        v[0] -= shift[0];
        v[1] -= shift[1];
    }
}

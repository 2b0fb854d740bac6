//! Triangle mesh artifact and printability inspection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An indexed triangle mesh. Vertices are millimeters in printer space.
///
/// Produced by the extrusion engine, possibly replaced wholesale by the
/// repair engine. Geometry is never mutated in place; every transformation
/// builds a new `Mesh`.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<[f32; 3]>,
    faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Axis-aligned bounding box as (min, max), or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<([f32; 3], [f32; 3])> {
        if self.vertices.is_empty() {
            return None;
        }
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        Some((min, max))
    }

    /// Extents along x/y/z in millimeters; zeros for an empty mesh.
    pub fn dimensions(&self) -> [f32; 3] {
        match self.bounding_box() {
            Some((min, max)) => [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
            None => [0.0; 3],
        }
    }

    /// Total triangle area in mm².
    pub fn surface_area(&self) -> f32 {
        let mut area = 0.0f64;
        for face in &self.faces {
            if let Some([a, b, c]) = self.face_vertices(face) {
                let u = sub(b, a);
                let v = sub(c, a);
                area += 0.5 * norm(cross(u, v)) as f64;
            }
        }
        area as f32
    }

    /// Signed enclosed volume in mm³ (positive for outward winding).
    pub fn signed_volume(&self) -> f32 {
        let mut volume = 0.0f64;
        for face in &self.faces {
            if let Some([a, b, c]) = self.face_vertices(face) {
                volume += dot(a, cross(b, c)) as f64 / 6.0;
            }
        }
        volume as f32
    }

    /// Inspect printability against a build volume (mm per axis).
    ///
    /// Pure inspection: the mesh is not modified, and identical meshes always
    /// produce identical reports.
    pub fn inspect(&self, build_volume: [f32; 3]) -> MeshReport {
        let dimensions = self.dimensions();
        let fits_volume = dimensions[0] <= build_volume[0]
            && dimensions[1] <= build_volume[1]
            && dimensions[2] <= build_volume[2];

        let mut degenerate_faces = 0usize;
        // Undirected edge -> directed traversal counts (a<b, b<a)
        let mut edges: HashMap<(u32, u32), [u32; 2]> = HashMap::new();

        for face in &self.faces {
            let [a, b, c] = *face;
            let oob = self.vertices.len() as u32;
            if a == b || b == c || c == a || a >= oob || b >= oob || c >= oob {
                degenerate_faces += 1;
                continue;
            }
            for (from, to) in [(a, b), (b, c), (c, a)] {
                let key = (from.min(to), from.max(to));
                let slot = if from < to { 0 } else { 1 };
                edges.entry(key).or_insert([0, 0])[slot] += 1;
            }
        }

        let mut boundary_edges = 0usize;
        let mut nonmanifold_edges = 0usize;
        let mut inconsistent_edges = 0usize;
        for counts in edges.values() {
            let total = counts[0] + counts[1];
            match total {
                1 => boundary_edges += 1,
                2 => {
                    // Two faces on an edge must traverse it in opposite
                    // directions, otherwise the winding flips between them
                    if counts[0] != 1 {
                        inconsistent_edges += 1;
                    }
                }
                _ => nonmanifold_edges += 1,
            }
        }

        let has_faces = self.faces.len() > degenerate_faces;
        let watertight =
            has_faces && degenerate_faces == 0 && boundary_edges == 0 && nonmanifold_edges == 0;
        let manifold = has_faces
            && degenerate_faces == 0
            && nonmanifold_edges == 0
            && inconsistent_edges == 0;

        MeshReport {
            watertight,
            manifold,
            fits_volume,
            dimensions,
            vertex_count: self.vertices.len(),
            face_count: self.faces.len(),
            boundary_edges,
            nonmanifold_edges,
            degenerate_faces,
            surface_area: self.surface_area(),
            volume: self.signed_volume().abs(),
        }
    }

    fn face_vertices(&self, face: &[u32; 3]) -> Option<[[f32; 3]; 3]> {
        let a = *self.vertices.get(face[0] as usize)?;
        let b = *self.vertices.get(face[1] as usize)?;
        let c = *self.vertices.get(face[2] as usize)?;
        Some([a, b, c])
    }
}

/// Result of mesh printability inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshReport {
    pub watertight: bool,
    pub manifold: bool,
    pub fits_volume: bool,
    pub dimensions: [f32; 3],
    pub vertex_count: usize,
    pub face_count: usize,
    pub boundary_edges: usize,
    pub nonmanifold_edges: usize,
    pub degenerate_faces: usize,
    pub surface_area: f32,
    pub volume: f32,
}

impl MeshReport {
    /// Watertight + manifold + fits the build volume.
    pub fn is_printable(&self) -> bool {
        self.watertight && self.manifold && self.fits_volume
    }

    pub fn fail_codes(&self) -> Vec<String> {
        let mut codes = Vec::new();
        if !self.watertight {
            codes.push(format!("not_watertight:{}", self.boundary_edges));
        }
        if !self.manifold {
            codes.push(format!("not_manifold:{}", self.nonmanifold_edges));
        }
        if !self.fits_volume {
            codes.push(format!(
                "exceeds_build_volume:{:.1}x{:.1}x{:.1}",
                self.dimensions[0], self.dimensions[1], self.dimensions[2]
            ));
        }
        if self.degenerate_faces > 0 {
            codes.push(format!("degenerate_faces:{}", self.degenerate_faces));
        }
        codes
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Closed unit cube: 8 vertices, 12 triangles, outward winding.
    fn unit_cube() -> Mesh {
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            // bottom (z=0, normal -z)
            [0, 2, 1],
            [0, 3, 2],
            // top (z=1, normal +z)
            [4, 5, 6],
            [4, 6, 7],
            // front (y=0)
            [0, 1, 5],
            [0, 5, 4],
            // right (x=1)
            [1, 2, 6],
            [1, 6, 5],
            // back (y=1)
            [2, 3, 7],
            [2, 7, 6],
            // left (x=0)
            [3, 0, 4],
            [3, 4, 7],
        ];
        Mesh::new(vertices, faces)
    }

    #[test]
    fn cube_is_watertight_and_manifold() {
        let report = unit_cube().inspect([256.0; 3]);
        assert!(report.watertight);
        assert!(report.manifold);
        assert!(report.fits_volume);
        assert!(report.is_printable());
        assert_eq!(report.boundary_edges, 0);
        assert_eq!(report.face_count, 12);
        assert!((report.volume - 1.0).abs() < 1e-4);
        assert!((report.surface_area - 6.0).abs() < 1e-4);
        assert!(report.fail_codes().is_empty());
    }

    #[test]
    fn missing_face_breaks_watertightness_but_not_manifoldness() {
        let cube = unit_cube();
        let faces = cube.faces()[..11].to_vec();
        let report = Mesh::new(cube.vertices().to_vec(), faces).inspect([256.0; 3]);
        assert!(!report.watertight);
        assert!(report.manifold);
        assert_eq!(report.boundary_edges, 3);
        assert!(report.fail_codes().iter().any(|c| c.starts_with("not_watertight")));
    }

    #[test]
    fn extra_face_on_edge_is_nonmanifold() {
        let cube = unit_cube();
        let mut faces = cube.faces().to_vec();
        let mut vertices = cube.vertices().to_vec();
        // A fin sharing edge 0-1 with the hull
        vertices.push([0.5, -1.0, 0.5]);
        faces.push([0, 1, 8]);
        let report = Mesh::new(vertices, faces).inspect([256.0; 3]);
        assert!(!report.manifold);
        assert!(!report.watertight);
        assert!(report.nonmanifold_edges >= 1);
    }

    #[test]
    fn inconsistent_winding_is_detected() {
        let cube = unit_cube();
        let mut faces = cube.faces().to_vec();
        let [a, b, c] = faces[0];
        faces[0] = [a, c, b];
        let report = Mesh::new(cube.vertices().to_vec(), faces).inspect([256.0; 3]);
        // Edge counts still pair up, so the hole check passes, but the
        // flipped face traverses its edges in the same direction as its
        // neighbors.
        assert!(!report.manifold);
    }

    #[test]
    fn oversized_mesh_fails_volume_fit() {
        let cube = unit_cube();
        let scaled: Vec<[f32; 3]> = cube
            .vertices()
            .iter()
            .map(|v| [v[0] * 300.0, v[1] * 300.0, v[2] * 300.0])
            .collect();
        let report = Mesh::new(scaled, cube.faces().to_vec()).inspect([256.0, 256.0, 256.0]);
        assert!(report.watertight);
        assert!(!report.fits_volume);
        assert!(!report.is_printable());
        assert!(report
            .fail_codes()
            .iter()
            .any(|c| c.starts_with("exceeds_build_volume")));
    }

    #[test]
    fn degenerate_and_out_of_bounds_faces_are_counted() {
        let mesh = Mesh::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 1], [0, 1, 9]],
        );
        let report = mesh.inspect([256.0; 3]);
        assert_eq!(report.degenerate_faces, 2);
        assert!(!report.watertight);
    }

    #[test]
    fn empty_mesh_is_not_printable() {
        let report = Mesh::new(Vec::new(), Vec::new()).inspect([256.0; 3]);
        assert!(!report.watertight);
        assert!(!report.manifold);
        assert_eq!(report.dimensions, [0.0; 3]);
    }
}

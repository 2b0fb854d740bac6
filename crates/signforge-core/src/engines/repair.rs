//! Built-in repair: weld vertices, drop junk faces, fill boundary loops.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;

use signforge_critics::Mesh;

use super::{EngineError, RepairEngine};

/// Weld epsilon as a fraction of the bounding-box diagonal.
const WELD_FRACTION: f32 = 1e-5;

/// Deterministic cleanup pass: welds coincident vertices onto an epsilon
/// grid, drops degenerate and duplicate faces, then fills each closed
/// boundary loop by fan triangulation.
///
/// The output is a candidate only; the mesh checkpoint re-validates it. When
/// a pass changes nothing the engine reports exhaustion instead of burning
/// retry budget on no-ops.
pub struct WeldRepairer;

#[async_trait]
impl RepairEngine for WeldRepairer {
    async fn repair(&self, mesh: &Mesh) -> Result<Mesh, EngineError> {
        self.rebuild(mesh)
    }
}

impl WeldRepairer {
    fn rebuild(&self, mesh: &Mesh) -> Result<Mesh, EngineError> {
        let Some((min, max)) = mesh.bounding_box() else {
            return Err(EngineError::InvalidInput("mesh has no vertices".into()));
        };
        if mesh.face_count() == 0 {
            return Err(EngineError::InvalidInput("mesh has no faces".into()));
        }
        let diagonal = ((max[0] - min[0]).powi(2)
            + (max[1] - min[1]).powi(2)
            + (max[2] - min[2]).powi(2))
        .sqrt();
        let epsilon = (diagonal * WELD_FRACTION).max(f32::EPSILON);

        // Weld coincident vertices onto an epsilon grid.
        let mut vertices: Vec<[f32; 3]> = Vec::new();
        let mut cell_of: HashMap<[i64; 3], u32> = HashMap::new();
        let mut remap: Vec<u32> = Vec::with_capacity(mesh.vertex_count());
        for v in mesh.vertices() {
            let key = [
                (v[0] / epsilon).round() as i64,
                (v[1] / epsilon).round() as i64,
                (v[2] / epsilon).round() as i64,
            ];
            let index = *cell_of.entry(key).or_insert_with(|| {
                vertices.push(*v);
                (vertices.len() - 1) as u32
            });
            remap.push(index);
        }
        let welded = mesh.vertex_count() - vertices.len();

        // Drop faces collapsed by the weld and exact duplicates.
        let mut faces: Vec<[u32; 3]> = Vec::new();
        let mut seen: HashSet<[u32; 3]> = HashSet::new();
        let mut dropped = 0usize;
        for face in mesh.faces() {
            let mut mapped = [0u32; 3];
            for (slot, &i) in mapped.iter_mut().zip(face.iter()) {
                *slot = *remap.get(i as usize).ok_or_else(|| {
                    EngineError::InvalidInput("face references a missing vertex".into())
                })?;
            }
            if mapped[0] == mapped[1] || mapped[1] == mapped[2] || mapped[0] == mapped[2] {
                dropped += 1;
                continue;
            }
            let mut key = mapped;
            key.sort_unstable();
            if !seen.insert(key) {
                dropped += 1;
                continue;
            }
            faces.push(mapped);
        }

        let filled = fill_boundary_loops(&mut faces);

        if welded == 0 && dropped == 0 && filled == 0 {
            return Err(EngineError::Exhausted("no repairable defects found".into()));
        }
        tracing::debug!(welded, dropped, filled, "repair pass complete");
        Ok(Mesh::new(vertices, faces))
    }
}

/// Fill every closed loop of boundary edges (directed edges whose reverse is
/// absent) with a fan, wound to pair against the existing faces. Open chains
/// and vertices with ambiguous boundary fan-out are left alone.
///
/// Returns the number of triangles added.
fn fill_boundary_loops(faces: &mut Vec<[u32; 3]>) -> usize {
    let mut directed: HashMap<(u32, u32), u32> = HashMap::new();
    for face in faces.iter() {
        for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            *directed.entry((a, b)).or_insert(0) += 1;
        }
    }

    let mut next: BTreeMap<u32, u32> = BTreeMap::new();
    let mut ambiguous: HashSet<u32> = HashSet::new();
    for (&(a, b), &count) in &directed {
        if count == 1 && !directed.contains_key(&(b, a)) {
            if next.insert(a, b).is_some() {
                ambiguous.insert(a);
            }
        }
    }
    for a in &ambiguous {
        next.remove(a);
    }

    let mut filled = 0usize;
    while let Some((&start, _)) = next.iter().next() {
        let mut ring = vec![start];
        let mut cursor = start;
        let closed = loop {
            let Some(step) = next.remove(&cursor) else {
                break false;
            };
            if step == start {
                break true;
            }
            ring.push(step);
            cursor = step;
        };
        if closed && ring.len() >= 3 {
            let anchor = ring[0];
            for i in 1..ring.len() - 1 {
                faces.push([anchor, ring[i + 1], ring[i]]);
                filled += 1;
            }
        }
    }
    filled
}

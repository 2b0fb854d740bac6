//! Binary STL encode/decode for mesh artifacts.

use std::collections::HashMap;
use thiserror::Error;

use crate::mesh::Mesh;

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

/// Errors from parsing STL bytes.
#[derive(Debug, Error)]
pub enum StlError {
    #[error("stl data too short: {0} bytes")]
    TooShort(usize),
    #[error("stl length {actual} does not match declared {triangles} triangles")]
    SizeMismatch { triangles: u32, actual: usize },
    #[error("ascii stl is not supported, expected binary")]
    Ascii,
}

/// Encode a mesh as binary STL (80-byte header, little-endian records,
/// normals recomputed from face winding).
pub fn to_stl_bytes(mesh: &Mesh) -> Vec<u8> {
    let faces = mesh.faces();
    let vertices = mesh.vertices();
    let mut out = Vec::with_capacity(HEADER_LEN + 4 + faces.len() * TRIANGLE_LEN);

    let mut header = [0u8; HEADER_LEN];
    let tag = b"signforge binary stl";
    header[..tag.len()].copy_from_slice(tag);
    out.extend_from_slice(&header);
    out.extend_from_slice(&(faces.len() as u32).to_le_bytes());

    for face in faces {
        let a = vertex_or_zero(vertices, face[0]);
        let b = vertex_or_zero(vertices, face[1]);
        let c = vertex_or_zero(vertices, face[2]);
        let normal = face_normal(a, b, c);
        for v in [normal, a, b, c] {
            for coord in v {
                out.extend_from_slice(&coord.to_le_bytes());
            }
        }
        // attribute byte count
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

/// Decode binary STL bytes into an indexed mesh.
///
/// STL stores each triangle's vertices inline; coincident vertices are merged
/// back (exact bit match) so topology checks see shared edges.
pub fn from_stl_bytes(bytes: &[u8]) -> Result<Mesh, StlError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(StlError::TooShort(bytes.len()));
    }

    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
    let expected = HEADER_LEN + 4 + count as usize * TRIANGLE_LEN;
    if bytes.len() != expected {
        if bytes.starts_with(b"solid") {
            return Err(StlError::Ascii);
        }
        return Err(StlError::SizeMismatch {
            triangles: count,
            actual: bytes.len(),
        });
    }

    let mut vertices: Vec<[f32; 3]> = Vec::new();
    let mut faces: Vec<[u32; 3]> = Vec::new();
    let mut index: HashMap<[u32; 3], u32> = HashMap::new();

    for tri in 0..count as usize {
        let base = HEADER_LEN + 4 + tri * TRIANGLE_LEN;
        let mut ids = [0u32; 3];
        for corner in 0..3 {
            // skip the 12-byte normal, then 12 bytes per vertex
            let offset = base + 12 + corner * 12;
            let v = [
                read_f32(bytes, offset),
                read_f32(bytes, offset + 4),
                read_f32(bytes, offset + 8),
            ];
            let key = [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()];
            let next = vertices.len() as u32;
            let id = *index.entry(key).or_insert_with(|| {
                vertices.push(v);
                next
            });
            ids[corner] = id;
        }
        faces.push(ids);
    }

    Ok(Mesh::new(vertices, faces))
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn vertex_or_zero(vertices: &[[f32; 3]], index: u32) -> [f32; 3] {
    vertices.get(index as usize).copied().unwrap_or([0.0; 3])
}

fn face_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0; 3]
    }
}

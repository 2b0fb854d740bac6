//! signforge-critics - Quality critics and gates for printable sign artifacts.
//!
//! This crate owns the artifact model produced by the sign pipeline and the
//! deterministic quality surface that judges it:
//! - **RasterImage / VectorImage / Mesh**: immutable artifacts flowing between
//!   pipeline stages, plus binary STL encode/decode for meshes
//! - **Metric evaluators**: SSIM-class structural similarity, Sobel edge
//!   overlap (IoU), and color-histogram fidelity between two rasters;
//!   watertight/manifold/volume-fit inspection for meshes
//! - **QualityGate**: weighted sub-scores + hard gates folded into a single
//!   pass/fail `QualityScore` per checkpoint
//!
//! Everything here is pure and synchronous: no I/O beyond byte-slice
//! encode/decode, no clocks, no retries. Identical inputs always produce
//! identical scores, which is what lets the pipeline treat a checkpoint
//! verdict as a fact rather than a sample.
//!
//! # Example
//!
//! ```no_run
//! use signforge_critics::{QualityGate, GateConfig};
//! use std::collections::BTreeMap;
//!
//! let gate = QualityGate::new(GateConfig::vector_default()).unwrap();
//! let mut scores = BTreeMap::new();
//! scores.insert("ssim".to_string(), 0.93);
//! scores.insert("edge_iou".to_string(), 0.81);
//! scores.insert("color".to_string(), 0.97);
//! let verdict = gate.evaluate("vector", scores).unwrap();
//! println!("passed: {}, overall: {:.3}", verdict.passed, verdict.overall);
//! ```

pub mod gate;
pub mod mesh;
pub mod metrics;
pub mod raster;
pub mod stl;
pub mod vector;

// Re-export commonly used types
pub use gate::{GateConfig, GateError, QualityGate, QualityScore};
pub use mesh::{Mesh, MeshReport};
pub use metrics::{color_fidelity, edge_overlap, ssim, MetricError};
pub use raster::{RasterError, RasterFormat, RasterImage};
pub use stl::StlError;
pub use vector::{Region, Span, VectorImage};

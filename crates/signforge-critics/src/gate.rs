//! Weighted quality gate applied at each pipeline checkpoint.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Weight table, overall threshold, and hard-gate set for one checkpoint.
///
/// Weights must sum to 1.0; hard gates are metric names that must score an
/// exact 1.0 for the checkpoint to pass, independent of the weighted
/// overall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub weights: BTreeMap<String, f32>,
    pub overall_threshold: f32,
    #[serde(default)]
    pub hard_gates: BTreeSet<String>,
}

impl GateConfig {
    /// Post-generation checkpoint: basic printability only.
    pub fn image_default() -> Self {
        Self {
            weights: weights(&[("format", 0.5), ("resolution", 0.5)]),
            overall_threshold: 1.0,
            hard_gates: names(&["format", "resolution"]),
        }
    }

    /// Post-vectorization checkpoint: similarity-dominant soft metrics.
    pub fn vector_default() -> Self {
        Self {
            weights: weights(&[("ssim", 0.40), ("edge_iou", 0.35), ("color", 0.25)]),
            overall_threshold: 0.85,
            hard_gates: BTreeSet::new(),
        }
    }

    /// Mesh checkpoint: watertight/manifold/volume-fit are all hard gates.
    pub fn mesh_default() -> Self {
        Self {
            weights: weights(&[("watertight", 0.4), ("manifold", 0.4), ("fits_volume", 0.2)]),
            overall_threshold: 1.0,
            hard_gates: names(&["watertight", "manifold", "fits_volume"]),
        }
    }

    /// Check weight-table and threshold consistency.
    pub fn validate(&self) -> Result<(), GateError> {
        if self.weights.is_empty() {
            return Err(GateError::EmptyWeights);
        }
        for (name, weight) in &self.weights {
            if *weight < 0.0 {
                return Err(GateError::NegativeWeight(name.clone()));
            }
        }
        let sum: f64 = self.weights.values().map(|w| *w as f64).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(GateError::WeightSum(sum as f32));
        }
        if !(0.0..=1.0).contains(&self.overall_threshold) {
            return Err(GateError::ThresholdRange(self.overall_threshold));
        }
        Ok(())
    }
}

/// Gate configuration errors, surfaced before any pipeline run starts.
#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("gate weights sum to {0}, expected 1.0")]
    WeightSum(f32),
    #[error("gate weight table is empty")]
    EmptyWeights,
    #[error("negative weight for metric '{0}'")]
    NegativeWeight(String),
    #[error("overall threshold {0} outside [0, 1]")]
    ThresholdRange(f32),
    #[error("missing sub-score for metric '{0}'")]
    MissingMetric(String),
}

/// Immutable verdict of one checkpoint evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub checkpoint: String,
    pub subscores: BTreeMap<String, f32>,
    pub overall: f32,
    pub threshold: f32,
    pub passed: bool,
    pub fail_codes: Vec<String>,
}

/// Combines named sub-scores into a weighted overall and a pass/fail
/// verdict.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: GateConfig,
}

impl QualityGate {
    /// Create a gate, rejecting inconsistent configuration up front.
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate one checkpoint's sub-scores.
    ///
    /// Every weighted or hard-gated metric must be present; extra sub-scores
    /// are carried through into the verdict unweighted.
    pub fn evaluate(
        &self,
        checkpoint: &str,
        subscores: BTreeMap<String, f32>,
    ) -> Result<QualityScore, GateError> {
        let mut fail_codes = Vec::new();

        // Weighted overall
        let mut overall = 0.0f64;
        for (name, weight) in &self.config.weights {
            let score = subscores
                .get(name)
                .ok_or_else(|| GateError::MissingMetric(name.clone()))?;
            overall += *weight as f64 * *score as f64;
        }

        // Hard gates demand an exact pass
        let mut hard_ok = true;
        for name in &self.config.hard_gates {
            let score = subscores
                .get(name)
                .ok_or_else(|| GateError::MissingMetric(name.clone()))?;
            if *score < 1.0 {
                hard_ok = false;
                fail_codes.push(format!("hard_gate_failed:{name}:{score:.3}"));
            }
        }

        let overall = overall as f32;
        let meets_threshold = overall as f64 >= self.config.overall_threshold as f64 - 1e-9;
        if !meets_threshold {
            fail_codes.push(format!("overall_below_threshold:{overall:.3}"));
        }

        let passed = hard_ok && meets_threshold;
        tracing::debug!(
            checkpoint,
            overall,
            passed,
            "quality gate evaluated"
        );

        Ok(QualityScore {
            checkpoint: checkpoint.to_string(),
            subscores,
            overall,
            threshold: self.config.overall_threshold,
            passed,
            fail_codes,
        })
    }
}

fn weights(entries: &[(&str, f32)]) -> BTreeMap<String, f32> {
    entries
        .iter()
        .map(|(name, w)| (name.to_string(), *w))
        .collect()
}

fn names(entries: &[&str]) -> BTreeSet<String> {
    entries.iter().map(|name| name.to_string()).collect()
}

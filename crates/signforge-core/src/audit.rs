//! Append-only audit trail of executor invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signforge_critics::QualityScore;

use crate::error::StageFailure;

/// Pipeline stages that produce attempt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Generate,
    Vectorize,
    Extrude,
    MeshValidate,
    Repair,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Generate => "generate",
            StageKind::Vectorize => "vectorize",
            StageKind::Extrude => "extrude",
            StageKind::MeshValidate => "mesh_validate",
            StageKind::Repair => "repair",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one executor invocation ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { failure: StageFailure },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            AttemptOutcome::Succeeded => None,
            AttemptOutcome::Failed { failure } => Some(failure),
        }
    }
}

/// One executor invocation: stage, timing, outcome, and the checkpoint
/// score folded into this stage, when there is one.
///
/// Records are immutable once appended. The image checkpoint folds into the
/// Generate record and the vector checkpoint into the Vectorize record;
/// MeshValidate carries its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: StageKind,
    /// 0-based attempt index within this stage
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
    pub score: Option<QualityScore>,
}

/// Strictly append-only, chronologically ordered record list for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    records: Vec<AttemptRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: AttemptRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.records.last()
    }

    /// Number of records for one stage.
    pub fn count_for(&self, stage: StageKind) -> usize {
        self.records.iter().filter(|r| r.stage == stage).count()
    }

    /// Start times never decrease along the trail.
    pub fn is_chronological(&self) -> bool {
        self.records
            .windows(2)
            .all(|pair| pair[0].started_at <= pair[1].started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn record(stage: StageKind, attempt: u32, ok: bool) -> AttemptRecord {
        let now = Utc::now();
        AttemptRecord {
            stage,
            attempt,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            outcome: if ok {
                AttemptOutcome::Succeeded
            } else {
                AttemptOutcome::Failed {
                    failure: StageFailure::new(FailureKind::ServiceUnavailable, "down"),
                }
            },
            score: None,
        }
    }

    #[test]
    fn appends_preserve_order_and_counts() {
        let mut trail = AuditTrail::new();
        trail.append(record(StageKind::Generate, 0, false));
        trail.append(record(StageKind::Generate, 1, true));
        trail.append(record(StageKind::Vectorize, 0, true));

        assert_eq!(trail.len(), 3);
        assert_eq!(trail.count_for(StageKind::Generate), 2);
        assert_eq!(trail.count_for(StageKind::Repair), 0);
        assert_eq!(trail.records()[0].stage, StageKind::Generate);
        assert!(trail.is_chronological());
    }

    #[test]
    fn outcome_exposes_failure_details() {
        let rec = record(StageKind::Generate, 0, false);
        let failure = rec.outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ServiceUnavailable);
        assert!(!rec.outcome.is_success());
    }

    #[test]
    fn records_serialize_with_tagged_outcome() {
        let rec = record(StageKind::MeshValidate, 0, true);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"stage\":\"mesh_validate\""));
        assert!(json.contains("\"status\":\"succeeded\""));
    }
}

//! DetectionState: the single persisted row per workload that the
//! Detection Coordinator and Evidence Aggregator read and write.

use super::evidence::WorkloadKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated confidence status for a workload's framework hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionStatus {
    Unknown,
    Suspected,
    Confirmed,
    Verified,
    Conflict,
}

/// State of the Coordinator's current (or most recent) probe dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A competing framework hypothesis that survived the conflict test in
/// the Evidence Aggregator (section 4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub framework: String,
    pub total_score: f64,
    pub primary_source: String,
}

/// One row per workload, holding the current aggregated detection result
/// and the Coordinator's scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionState {
    pub workload_uid: String,
    pub framework: Option<String>,
    pub frameworks: Vec<String>,
    pub workload_kind: Option<WorkloadKind>,
    pub confidence: f64,
    pub status: DetectionStatus,
    pub task_state: TaskState,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub evidence_count: usize,
    /// Deduplicated, sorted list of sources that contributed to the
    /// current aggregation result
    pub sources: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Non-null iff `status` is `Confirmed` or `Verified`; set only on the
    /// first transition into one of those statuses (spec invariant).
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DetectionState {
    /// A freshly created row for a newly discovered workload, in INIT
    /// territory: unknown status, pending task state, no attempts yet.
    pub fn new(workload_uid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            workload_uid: workload_uid.into(),
            framework: None,
            frameworks: Vec::new(),
            workload_kind: None,
            confidence: 0.0,
            status: DetectionStatus::Unknown,
            task_state: TaskState::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            evidence_count: 0,
            sources: Vec::new(),
            conflicts: Vec::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    /// Verifies the spec invariant that `confirmed_at` tracks
    /// `status ∈ {Confirmed, Verified}` exactly.
    pub fn invariant_holds(&self) -> bool {
        let should_be_confirmed =
            matches!(self.status, DetectionStatus::Confirmed | DetectionStatus::Verified);
        should_be_confirmed == self.confirmed_at.is_some()
    }
}

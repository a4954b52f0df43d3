//! Coverage: per-(workload, source) progress tracker used by the
//! Detection Coordinator to decide which probes still need dispatching.

use super::evidence::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection progress for one (workload, source) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStatus {
    Pending,
    Collecting,
    Collected,
    Failed,
    NotApplicable,
}

impl CoverageStatus {
    /// Whether `to` is a legal transition from `self`, per the graph in
    /// spec section 4.D: `pending -> collecting -> {collected, failed};
    /// failed -> pending` (retry). `NotApplicable` is a terminal sink
    /// reachable from any state (workload-not-found edge case).
    pub fn can_transition_to(self, to: CoverageStatus) -> bool {
        use CoverageStatus::*;
        match (self, to) {
            (_, NotApplicable) => true,
            (s, t) if s == t => true,
            (Pending, Collecting) => true,
            (Collecting, Collected) | (Collecting, Failed) => true,
            (Failed, Pending) => true,
            _ => false,
        }
    }
}

/// Per-(workload, source) coverage row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coverage {
    pub workload_uid: String,
    pub source: Source,
    pub status: CoverageStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Time window this source has collected over
    pub covered_from: Option<DateTime<Utc>>,
    pub covered_to: Option<DateTime<Utc>>,
    /// Window the Coordinator asked the probe to cover on its last dispatch
    pub pending_from: Option<DateTime<Utc>>,
    pub pending_to: Option<DateTime<Utc>>,
    /// Log source only: window of logs the external ingester has made
    /// available, reported via `update_log_available`.
    pub log_available_from: Option<DateTime<Utc>>,
    pub log_available_to: Option<DateTime<Utc>>,
    /// Evidence rows this source has produced for this workload
    pub evidence_count: usize,
}

impl Coverage {
    /// A fresh, pending coverage row for a (workload, source) pair
    pub fn new(workload_uid: impl Into<String>, source: Source) -> Self {
        Self {
            workload_uid: workload_uid.into(),
            source,
            status: CoverageStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            last_success_at: None,
            last_error: None,
            covered_from: None,
            covered_to: None,
            pending_from: None,
            pending_to: None,
            log_available_from: None,
            log_available_to: None,
            evidence_count: 0,
        }
    }

    /// Attempt the status transition, enforcing the legal-transition graph
    /// and the monotonic `attempt_count` invariant.
    pub fn transition_to(&mut self, status: CoverageStatus) -> crate::error::Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(crate::error::Error::Coverage(format!(
                "illegal coverage transition {:?} -> {:?} for {}/{}",
                self.status, status, self.workload_uid, self.source
            )));
        }
        self.status = status;
        Ok(())
    }
}

/// A non-empty time window, used for log-gap and probe-dispatch parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        if from < to {
            Some(Self { from, to })
        } else {
            None
        }
    }
}

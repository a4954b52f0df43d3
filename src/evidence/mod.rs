//! Evidence Store (spec component C): an append-only, source-tagged log
//! of observations about a workload's framework identity.
//!
//! `Append` never deduplicates — repeated observations are a deliberate
//! signal (weight accumulation in the Aggregator), not noise. The only
//! field ever mutated in place is `processed`, flipped in batches by
//! [`EvidenceStore::mark_processed`].

use crate::model::evidence::{Evidence, Source};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// Thread-safe append-only evidence log, shared across all Coordinators.
pub struct EvidenceStore {
    rows: Mutex<Vec<Evidence>>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    /// O(1) insert; no dedup.
    pub fn append(&self, evidence: Evidence) {
        self.rows.lock().unwrap().push(evidence);
    }

    /// Unprocessed rows for a workload, ordered by detection time
    /// ascending (the order the Aggregator must see them in).
    pub fn list_unprocessed(&self, workload_uid: &str) -> Vec<Evidence> {
        let mut rows: Vec<Evidence> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workload_uid == workload_uid && !e.processed)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.detected_at);
        rows
    }

    /// Rows for a workload from a single source, in insertion order.
    pub fn list_by_source(&self, workload_uid: &str, source: Source) -> Vec<Evidence> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workload_uid == workload_uid && e.source == source)
            .cloned()
            .collect()
    }

    /// Most recent `limit` rows for a workload, newest first — backs the
    /// detection query endpoint (spec section 6).
    pub fn list_recent(&self, workload_uid: &str, limit: usize) -> Vec<Evidence> {
        let mut rows: Vec<Evidence> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workload_uid == workload_uid)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        rows.truncate(limit);
        rows
    }

    /// Total rows for a workload, used to keep `DetectionState.evidence_count`
    /// an accurate invariant rather than an ad hoc counter.
    pub fn count_for_workload(&self, workload_uid: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workload_uid == workload_uid)
            .count()
    }

    /// Idempotent batch flip of `processed` to true.
    pub fn mark_processed(&self, ids: &[Uuid]) {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) {
                row.processed = true;
            }
        }
    }

    /// Delete rows whose `expires_at` has passed. Returns the count
    /// removed.
    pub fn delete_expired(&self, now: DateTime<Utc>) -> usize {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|e| e.expires_at.map(|exp| exp >= now).unwrap_or(true));
        before - rows.len()
    }
}

impl Default for EvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::evidence::{SourceKind, WorkloadKind};
    use chrono::Duration;

    fn sample(workload: &str, source: Source, confidence: f64, at: DateTime<Utc>) -> Evidence {
        let mut e = Evidence::new(
            workload,
            source,
            SourceKind::Passive,
            "pytorch",
            WorkloadKind::Training,
            confidence,
            serde_json::json!({}),
            at,
        );
        e.id = Uuid::new_v4();
        e
    }

    #[test]
    fn mark_processed_removes_rows_from_unprocessed_listing() {
        let store = EvidenceStore::new();
        let now = Utc::now();
        let e = sample("w1", Source::Wandb, 0.9, now);
        let id = e.id;
        store.append(e);

        assert_eq!(store.list_unprocessed("w1").len(), 1);
        store.mark_processed(&[id]);
        assert!(store.list_unprocessed("w1").is_empty());
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let store = EvidenceStore::new();
        let now = Utc::now();
        let e = sample("w1", Source::Wandb, 0.9, now);
        let id = e.id;
        store.append(e);

        store.mark_processed(&[id]);
        store.mark_processed(&[id]);
        assert!(store.list_unprocessed("w1").is_empty());
    }

    #[test]
    fn append_does_not_deduplicate() {
        let store = EvidenceStore::new();
        let now = Utc::now();
        store.append(sample("w1", Source::Log, 0.6, now));
        store.append(sample("w1", Source::Log, 0.6, now));
        assert_eq!(store.count_for_workload("w1"), 2);
    }

    #[test]
    fn list_unprocessed_is_ordered_by_detection_time() {
        let store = EvidenceStore::new();
        let now = Utc::now();
        store.append(sample("w1", Source::Log, 0.6, now + Duration::seconds(5)));
        store.append(sample("w1", Source::Wandb, 0.9, now));
        let rows = store.list_unprocessed("w1");
        assert_eq!(rows[0].source, Source::Wandb);
        assert_eq!(rows[1].source, Source::Log);
    }

    #[test]
    fn delete_expired_removes_only_past_expiry_rows() {
        let store = EvidenceStore::new();
        let now = Utc::now();
        let mut expired = sample("w1", Source::Log, 0.5, now);
        expired.expires_at = Some(now - Duration::seconds(1));
        let mut live = sample("w1", Source::Log, 0.5, now);
        live.expires_at = Some(now + Duration::seconds(60));
        store.append(expired);
        store.append(live);

        let removed = store.delete_expired(now);
        assert_eq!(removed, 1);
        assert_eq!(store.count_for_workload("w1"), 1);
    }
}

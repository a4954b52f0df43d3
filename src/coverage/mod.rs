//! Coverage Tracker (spec component D): per-(workload, source) progress
//! used by the Detection Coordinator to decide what still needs probing.

use crate::error::{Error, Result};
use crate::model::coverage::{Coverage, CoverageStatus, Window};
use crate::model::evidence::Source;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

type Key = (String, Source);

/// Shared store of [`Coverage`] rows, one per (workload, source) pair.
pub struct CoverageTracker {
    rows: Mutex<HashMap<Key, Coverage>>,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, workload_uid: &str, source: Source) -> Option<Coverage> {
        self.rows
            .lock()
            .unwrap()
            .get(&(workload_uid.to_string(), source))
            .cloned()
    }

    /// All coverage rows known for a workload, one per source probed so far.
    pub fn list_for_workload(&self, workload_uid: &str) -> Vec<Coverage> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.workload_uid == workload_uid)
            .cloned()
            .collect()
    }

    /// Insert or replace a coverage row, enforcing the monotonic
    /// `attempt_count` invariant and the legal status-transition graph
    /// when a row already exists for this key.
    pub fn upsert(&self, row: Coverage) -> Result<()> {
        let key = (row.workload_uid.clone(), row.source);
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(&key) {
            if row.attempt_count < existing.attempt_count {
                return Err(Error::Coverage(format!(
                    "attempt_count would decrease for {}/{}: {} -> {}",
                    row.workload_uid, row.source, existing.attempt_count, row.attempt_count
                )));
            }
            if row.status != existing.status && !existing.status.can_transition_to(row.status) {
                return Err(Error::Coverage(format!(
                    "illegal coverage transition {:?} -> {:?} for {}/{}",
                    existing.status, row.status, row.workload_uid, row.source
                )));
            }
            if let (Some(existing_to), Some(new_to)) = (existing.covered_to, row.covered_to) {
                if new_to < existing_to {
                    return Err(Error::Coverage(format!(
                        "covered_to would decrease for {}/{}: {} -> {}",
                        row.workload_uid, row.source, existing_to, new_to
                    )));
                }
            }
        }
        rows.insert(key, row);
        Ok(())
    }

    /// Monotonic update of `log_available_to`. No-op if `ts` does not
    /// advance the current value.
    pub fn update_log_available(&self, workload_uid: &str, ts: DateTime<Utc>) {
        let key = (workload_uid.to_string(), Source::Log);
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry(key)
            .or_insert_with(|| Coverage::new(workload_uid, Source::Log));
        let advances = row.log_available_to.map(|cur| ts > cur).unwrap_or(true);
        if advances {
            if row.log_available_from.is_none() {
                row.log_available_from = Some(ts);
            }
            row.log_available_to = Some(ts);
        }
    }

    /// First non-empty gap between what's covered and what's available
    /// for the log source, preferring the forward gap (new logs) over the
    /// backward gap (startup logs not yet scanned).
    pub fn find_log_gap(&self, workload_uid: &str) -> Option<Window> {
        let rows = self.rows.lock().unwrap();
        let cov = rows.get(&(workload_uid.to_string(), Source::Log))?;

        let forward = match (cov.covered_to, cov.log_available_to) {
            (Some(covered_to), Some(available_to)) if available_to > covered_to => {
                Window::new(covered_to, available_to)
            }
            (None, Some(available_to)) => {
                let from = cov.log_available_from.unwrap_or(available_to);
                Window::new(from, available_to)
            }
            _ => None,
        };
        if forward.is_some() {
            return forward;
        }

        match (cov.covered_from, cov.log_available_from) {
            (Some(covered_from), Some(available_from)) if covered_from > available_from => {
                Window::new(available_from, covered_from)
            }
            _ => None,
        }
    }
}

impl Default for CoverageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn covered_to_never_decreases_through_upsert() {
        let tracker = CoverageTracker::new();
        let now = Utc::now();
        let mut row = Coverage::new("w1", Source::Log);
        row.covered_to = Some(now);
        tracker.upsert(row.clone()).unwrap();

        row.attempt_count += 1;
        row.covered_to = Some(now - Duration::seconds(10));
        assert!(tracker.upsert(row).is_err());
    }

    #[test]
    fn attempt_count_cannot_decrease() {
        let tracker = CoverageTracker::new();
        let mut row = Coverage::new("w1", Source::Process);
        row.attempt_count = 3;
        tracker.upsert(row.clone()).unwrap();

        row.attempt_count = 2;
        assert!(tracker.upsert(row).is_err());
    }

    #[test]
    fn illegal_status_transition_is_rejected() {
        let tracker = CoverageTracker::new();
        let row = Coverage::new("w1", Source::Image);
        tracker.upsert(row.clone()).unwrap();

        let mut collected = row;
        collected.status = CoverageStatus::Collected;
        assert!(tracker.upsert(collected).is_err());
    }

    #[test]
    fn update_log_available_is_monotonic_and_noop_when_not_advancing() {
        let tracker = CoverageTracker::new();
        let now = Utc::now();
        tracker.update_log_available("w1", now);
        tracker.update_log_available("w1", now - Duration::seconds(5));
        let row = tracker.get("w1", Source::Log).unwrap();
        assert_eq!(row.log_available_to, Some(now));
    }

    #[test]
    fn find_log_gap_prefers_forward_over_backward() {
        let tracker = CoverageTracker::new();
        let now = Utc::now();
        let mut row = Coverage::new("w1", Source::Log);
        row.covered_from = Some(now - Duration::minutes(5));
        row.covered_to = Some(now);
        row.log_available_from = Some(now - Duration::minutes(10));
        row.log_available_to = Some(now + Duration::minutes(2));
        tracker.upsert(row).unwrap();

        let gap = tracker.find_log_gap("w1").unwrap();
        assert_eq!(gap.from, now);
        assert_eq!(gap.to, now + Duration::minutes(2));
    }

    #[test]
    fn find_log_gap_falls_back_to_backward_gap() {
        let tracker = CoverageTracker::new();
        let now = Utc::now();
        let mut row = Coverage::new("w1", Source::Log);
        row.covered_from = Some(now);
        row.covered_to = Some(now + Duration::minutes(5));
        row.log_available_from = Some(now - Duration::minutes(10));
        row.log_available_to = Some(now + Duration::minutes(5));
        tracker.upsert(row).unwrap();

        let gap = tracker.find_log_gap("w1").unwrap();
        assert_eq!(gap.from, now - Duration::minutes(10));
        assert_eq!(gap.to, now);
    }

    #[test]
    fn find_log_gap_is_none_when_fully_covered() {
        let tracker = CoverageTracker::new();
        let now = Utc::now();
        let mut row = Coverage::new("w1", Source::Log);
        row.covered_from = Some(now - Duration::minutes(10));
        row.covered_to = Some(now);
        row.log_available_from = Some(now - Duration::minutes(10));
        row.log_available_to = Some(now);
        tracker.upsert(row).unwrap();

        assert!(tracker.find_log_gap("w1").is_none());
    }
}

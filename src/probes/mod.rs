//! Probe Executors (spec component G): four pluggable collectors that
//! each turn an active look at a workload into Evidence rows plus a
//! Coverage update.
//!
//! All four share the `Execute(workload, params) -> (evidence, coverage)`
//! contract from spec 4.G, expressed here as [`ProbeExecutor`]. Dispatch
//! gating (spec 4.F step 1-2) is also per-probe, since each source has its
//! own precondition: a ready pod for `process`, a non-empty log gap for
//! `log`, a pod record at all for `image`/`label`.

pub mod image;
pub mod label;
pub mod log;
pub mod patterns;
pub mod priority;
pub mod process;

use crate::interfaces::PodStatus;
use crate::model::coverage::{Coverage, CoverageStatus, Window};
use crate::model::evidence::{Evidence, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fixed priority order probes are dispatched in within one tick (spec
/// 4.F): `process=100, log=80, image=60, label=40`.
pub fn priority_for(source: Source) -> u32 {
    match source {
        Source::Process => 100,
        Source::Log => 80,
        Source::Image => 60,
        Source::Label => 40,
        _ => 0,
    }
}

/// Parameters the Coordinator hands a dispatched probe. Only `log` uses
/// `window` (the gap `FindLogGap` returned); the others ignore it.
#[derive(Debug, Clone, Default)]
pub struct ProbeParams {
    pub window: Option<Window>,
}

/// What the Coordinator needs about a workload to decide whether (and how)
/// to dispatch a probe this tick.
pub struct DispatchContext<'a> {
    pub coverage: Option<&'a Coverage>,
    pub pod: Option<&'a PodStatus>,
    pub now: DateTime<Utc>,
    pub process_ready_secs: i64,
    pub max_attempts: u32,
    /// Result of `CoverageTracker::find_log_gap`, computed once per tick
    /// by the Coordinator (it owns the tracker; probes don't).
    pub log_gap: Option<Window>,
}

/// A source is a dispatch candidate only while its coverage status is
/// pending/failed and it hasn't exhausted its attempt budget (spec 4.F
/// step 1, shared across all four probes).
fn coverage_allows_dispatch(coverage: Option<&Coverage>, max_attempts: u32) -> bool {
    match coverage {
        None => true,
        Some(c) => {
            matches!(c.status, CoverageStatus::Pending | CoverageStatus::Failed)
                && c.attempt_count < max_attempts
        }
    }
}

/// Result of one probe invocation: new evidence rows plus the coverage
/// row to upsert afterward. The Coordinator applies coverage updates
/// sequentially after all of a tick's probes join, never concurrently.
pub struct ProbeOutcome {
    pub evidence: Vec<Evidence>,
    pub coverage: Coverage,
}

#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    fn source(&self) -> Source;

    fn priority(&self) -> u32 {
        priority_for(self.source())
    }

    /// Whether (and with what parameters) this probe should be dispatched
    /// this tick. `None` means skip.
    fn is_dispatchable(&self, ctx: &DispatchContext) -> Option<ProbeParams>;

    /// Run to completion. A transport failure (spec 7: "Transient I/O")
    /// should be returned as `Err`; the Coordinator marks coverage
    /// `failed` and counts the attempt. A workload that has disappeared
    /// from the inspector's view should be signalled via
    /// `Error::NotFound` so the Coordinator can mark coverage
    /// `not_applicable` instead of scheduling a retry.
    async fn execute(
        &self,
        workload_uid: &str,
        coverage: Option<&Coverage>,
        params: ProbeParams,
    ) -> crate::error::Result<ProbeOutcome>;
}

/// A freshly attempted, successful coverage row, the common tail of every
/// probe's `execute`.
fn advance_coverage_success(
    existing: Option<&Coverage>,
    workload_uid: &str,
    source: Source,
    now: DateTime<Utc>,
    covered: Option<Window>,
    evidence_count_delta: usize,
) -> Coverage {
    let mut row = existing
        .cloned()
        .unwrap_or_else(|| Coverage::new(workload_uid, source));
    if row.status == CoverageStatus::Pending || row.status == CoverageStatus::Failed {
        let _ = row.transition_to(CoverageStatus::Collecting);
    }
    let _ = row.transition_to(CoverageStatus::Collected);
    row.attempt_count += 1;
    row.last_attempt_at = Some(now);
    row.last_success_at = Some(now);
    row.last_error = None;
    row.evidence_count += evidence_count_delta;
    if let Some(w) = covered {
        row.covered_from = Some(row.covered_from.map(|f| f.min(w.from)).unwrap_or(w.from));
        row.covered_to = Some(row.covered_to.map(|t| t.max(w.to)).unwrap_or(w.to));
    }
    row
}

/// A failed attempt: coverage moves to `failed`, attempt still counted.
fn advance_coverage_failure(
    existing: Option<&Coverage>,
    workload_uid: &str,
    source: Source,
    now: DateTime<Utc>,
    error: String,
) -> Coverage {
    let mut row = existing
        .cloned()
        .unwrap_or_else(|| Coverage::new(workload_uid, source));
    if row.status == CoverageStatus::Pending {
        let _ = row.transition_to(CoverageStatus::Collecting);
    }
    let _ = row.transition_to(CoverageStatus::Failed);
    row.attempt_count += 1;
    row.last_attempt_at = Some(now);
    row.last_error = Some(error);
    row
}

pub(crate) use advance_coverage_failure as failure_coverage;
pub(crate) use advance_coverage_success as success_coverage;
pub(crate) use coverage_allows_dispatch as dispatch_allowed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_matches_spec() {
        assert!(priority_for(Source::Process) > priority_for(Source::Log));
        assert!(priority_for(Source::Log) > priority_for(Source::Image));
        assert!(priority_for(Source::Image) > priority_for(Source::Label));
    }

    #[test]
    fn dispatch_allowed_respects_attempt_budget() {
        let mut coverage = Coverage::new("w1", Source::Image);
        coverage.attempt_count = 5;
        assert!(!dispatch_allowed(Some(&coverage), 5));
        coverage.attempt_count = 4;
        assert!(dispatch_allowed(Some(&coverage), 5));
    }

    #[test]
    fn dispatch_allowed_excludes_collected_sources() {
        let mut coverage = Coverage::new("w1", Source::Label);
        coverage.transition_to(CoverageStatus::Collecting).unwrap();
        coverage.transition_to(CoverageStatus::Collected).unwrap();
        assert!(!dispatch_allowed(Some(&coverage), 5));
    }
}

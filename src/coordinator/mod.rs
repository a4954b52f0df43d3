//! Detection Coordinator (spec component F): the state machine deciding,
//! per workload, which probes to dispatch this tick, when to retry, and
//! when a framework hypothesis has been confirmed.
//!
//! `INIT -> WAITING -> PROBING -> ANALYZING -> {CONFIRMED, WAITING,
//! COMPLETED}`. A single `tokio::sync::Mutex` per workload id enforces
//! that no two ticks for the same workload ever overlap, mirroring the
//! `Arc<Mutex<...>>` caching pattern used elsewhere in this crate for
//! shared, concurrently-accessed state.

use crate::aggregator::Aggregator;
use crate::config::{AggregatorConfig, CoordinatorConfig};
use crate::coverage::CoverageTracker;
use crate::error::{Error, Result};
use crate::evidence::EvidenceStore;
use crate::interfaces::PodInspector;
use crate::model::detection_state::{DetectionState, DetectionStatus, TaskState};
use crate::probes::{DispatchContext, ProbeExecutor};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Exponential backoff with a floor at the base interval and a ceiling:
/// `min(max, base * 2^(attempt-1))`, attempt >= 1.
pub fn backoff_seconds(attempt_count: u32, base_secs: u64, max_secs: u64) -> u64 {
    let attempt = attempt_count.max(1);
    let shift = attempt.saturating_sub(1).min(32);
    let scaled = base_secs.saturating_mul(1u64 << shift);
    scaled.min(max_secs)
}

/// Persisted DetectionState rows, one per workload, shared across all
/// Coordinators the way `EvidenceStore` and `CoverageTracker` are.
pub struct DetectionStateStore {
    rows: Mutex<HashMap<String, DetectionState>>,
}

impl DetectionStateStore {
    pub fn new() -> Self {
        Self { rows: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, workload_uid: &str) -> Option<DetectionState> {
        self.rows.lock().unwrap().get(workload_uid).cloned()
    }

    pub fn upsert(&self, state: DetectionState) {
        self.rows.lock().unwrap().insert(state.workload_uid.clone(), state);
    }

    /// Workload ids not yet completed whose `next_attempt_at` has arrived
    /// — the poll loop's dispatch set. The persisted `next_attempt_at`
    /// column is the durable driver (spec section 6); this just scans it.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.task_state != TaskState::Completed)
            .filter(|s| s.next_attempt_at.map(|t| t <= now).unwrap_or(false))
            .map(|s| s.workload_uid.clone())
            .collect()
    }
}

impl Default for DetectionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one `Coordinator::tick` call.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Status reached {confirmed, verified}; task_state is now completed.
    Confirmed { framework: String },
    /// Not yet conclusive; scheduled to run again at `next_attempt_at`.
    Waiting { next_attempt_at: DateTime<Utc> },
    /// Workload has terminated; no further ticks will be scheduled.
    Completed,
}

pub struct Coordinator<I: PodInspector> {
    config: CoordinatorConfig,
    inspector: Arc<I>,
    evidence: Arc<EvidenceStore>,
    coverage: Arc<CoverageTracker>,
    states: Arc<DetectionStateStore>,
    aggregator: Aggregator,
    probes: Vec<Arc<dyn ProbeExecutor>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<I: PodInspector + 'static> Coordinator<I> {
    pub fn new(
        config: CoordinatorConfig,
        aggregator_config: &AggregatorConfig,
        inspector: Arc<I>,
        evidence: Arc<EvidenceStore>,
        coverage: Arc<CoverageTracker>,
        states: Arc<DetectionStateStore>,
        probes: Vec<Arc<dyn ProbeExecutor>>,
    ) -> Self {
        Self {
            config,
            inspector,
            evidence,
            coverage,
            states,
            aggregator: Aggregator::new(aggregator_config),
            probes,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// INIT: register a freshly discovered workload, scheduling its first
    /// tick `init_delay_secs` out.
    pub fn discover(&self, workload_uid: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut state = DetectionState::new(workload_uid, now);
        let next = now + Duration::seconds(self.config.init_delay_secs as i64);
        state.next_attempt_at = Some(next);
        self.states.upsert(state);
        next
    }

    fn workload_lock(&self, workload_uid: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(workload_uid.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Run one tick for `workload_uid`. `terminated` signals that the
    /// workload's owning pods are gone, driving straight to COMPLETED
    /// regardless of detection progress.
    pub async fn tick(&self, workload_uid: &str, terminated: bool) -> Result<TickOutcome> {
        let lock = self.workload_lock(workload_uid);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut state = self
            .states
            .get(workload_uid)
            .ok_or_else(|| Error::NotFound(format!("no DetectionState for {workload_uid}")))?;

        if terminated {
            state.task_state = TaskState::Completed;
            state.next_attempt_at = None;
            state.updated_at = now;
            self.states.upsert(state);
            return Ok(TickOutcome::Completed);
        }

        let pod = self.inspector.pod_status(workload_uid).await?;
        let log_gap = self.coverage.find_log_gap(workload_uid);

        let mut dispatchable = Vec::new();
        for probe in &self.probes {
            let coverage_row = self.coverage.get(workload_uid, probe.source());
            let ctx = DispatchContext {
                coverage: coverage_row.as_ref(),
                pod: pod.as_ref(),
                now,
                process_ready_secs: self.config.process_ready_secs as i64,
                max_attempts: self.config.max_attempts_per_source,
                log_gap,
            };
            if let Some(params) = probe.is_dispatchable(&ctx) {
                dispatchable.push((probe.clone(), params));
            }
        }
        dispatchable.sort_by_key(|(p, _)| std::cmp::Reverse(p.priority()));

        if !dispatchable.is_empty() {
            state.task_state = TaskState::InProgress;
            self.states.upsert(state.clone());

            let mut handles = Vec::with_capacity(dispatchable.len());
            for (probe, params) in dispatchable {
                let workload_uid = workload_uid.to_string();
                let coverage_row = self.coverage.get(&workload_uid, probe.source());
                handles.push(tokio::spawn(async move {
                    probe.execute(&workload_uid, coverage_row.as_ref(), params).await
                }));
            }

            let mut evidence_rows = Vec::new();
            let mut coverage_updates = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok(Ok(outcome)) => {
                        evidence_rows.extend(outcome.evidence);
                        coverage_updates.push(outcome.coverage);
                    }
                    Ok(Err(e)) => {
                        log::warn!(target: "detection_coordinator", "{workload_uid}: probe failed: {e}");
                    }
                    Err(join_err) => {
                        log::warn!(target: "detection_coordinator", "{workload_uid}: probe task panicked: {join_err}");
                    }
                }
            }

            // Coverage updates from this tick's probes are applied
            // sequentially after the join, never concurrently.
            for row in coverage_updates {
                self.coverage.upsert(row)?;
            }
            for e in evidence_rows {
                self.evidence.append(e);
            }
        }

        let outcome = self.aggregator.aggregate(workload_uid, &self.evidence, state, now);
        let mut new_state = outcome.state;
        new_state.last_attempt_at = Some(now);
        new_state.attempt_count += 1;

        if matches!(new_state.status, DetectionStatus::Confirmed | DetectionStatus::Verified) {
            log::info!(target: "detection_coordinator", "{workload_uid}: confirmed as {:?}", new_state.framework);
            new_state.task_state = TaskState::Completed;
            new_state.next_attempt_at = None;
            let framework = new_state.framework.clone().unwrap_or_default();
            self.states.upsert(new_state);
            return Ok(TickOutcome::Confirmed { framework });
        }

        let backoff = backoff_seconds(
            new_state.attempt_count,
            self.config.backoff_base_secs,
            self.config.backoff_max_secs,
        );
        let next_attempt_at = now + Duration::seconds(backoff as i64);
        new_state.task_state = TaskState::Pending;
        new_state.next_attempt_at = Some(next_attempt_at);
        log::debug!(target: "detection_coordinator", "{workload_uid}: waiting, next attempt at {next_attempt_at}");
        self.states.upsert(new_state);
        Ok(TickOutcome::Waiting { next_attempt_at })
    }
}

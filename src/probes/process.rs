//! Process probe: inspects a pod's process tree for the first Python
//! process and pattern-matches its cmdline (training frameworks) and
//! environment (wrapper frameworks).

use super::patterns::{find_matches, CMDLINE_PATTERNS, ENV_PATTERNS};
use super::priority::resolve_primary;
use super::{dispatch_allowed, failure_coverage, success_coverage, DispatchContext, ProbeExecutor, ProbeOutcome, ProbeParams};
use crate::error::{Error, Result};
use crate::interfaces::PodInspector;
use crate::model::evidence::{Evidence, Source, SourceKind, WorkloadKind};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const CMDLINE_CONFIDENCE: f64 = 0.70;
const ENV_CONFIDENCE: f64 = 0.80;

pub struct ProcessProbe<I: PodInspector> {
    inspector: Arc<I>,
}

impl<I: PodInspector> ProcessProbe<I> {
    pub fn new(inspector: Arc<I>) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl<I: PodInspector> ProbeExecutor for ProcessProbe<I> {
    fn source(&self) -> Source {
        Source::Process
    }

    fn is_dispatchable(&self, ctx: &DispatchContext) -> Option<ProbeParams> {
        if !dispatch_allowed(ctx.coverage, ctx.max_attempts) {
            return None;
        }
        let pod = ctx.pod?;
        if !pod.ready {
            return None;
        }
        let running_since = pod.running_since?;
        let ready_for = ctx.now.signed_duration_since(running_since).num_seconds();
        if ready_for < ctx.process_ready_secs {
            return None;
        }
        Some(ProbeParams::default())
    }

    async fn execute(
        &self,
        workload_uid: &str,
        coverage: Option<&crate::model::coverage::Coverage>,
        _params: ProbeParams,
    ) -> Result<ProbeOutcome> {
        let now = Utc::now();
        let processes = match self.inspector.process_tree(workload_uid).await {
            Ok(p) => p,
            Err(Error::NotFound(msg)) => {
                let mut row = coverage
                    .cloned()
                    .unwrap_or_else(|| crate::model::coverage::Coverage::new(workload_uid, Source::Process));
                let _ = row.transition_to(crate::model::coverage::CoverageStatus::NotApplicable);
                row.last_error = Some(msg);
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: row,
                });
            }
            Err(e) => {
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: failure_coverage(coverage, workload_uid, Source::Process, now, e.to_string()),
                });
            }
        };

        let mut evidence = Vec::new();
        if let Some(proc) = processes.iter().find(|p| p.name.starts_with("python")) {
            let cmdline_hits = find_matches(&proc.cmdline, CMDLINE_PATTERNS);
            let matched_frameworks: Vec<&str> = cmdline_hits.iter().map(|m| m.framework).collect();

            // When one cmdline matches more than one framework pattern
            // (e.g. a primus launcher invoking megatron), resolve which
            // one is primary and record the wrapper/base relationship on
            // that row, per spec 4.G's priority list.
            let multi: Vec<String> = matched_frameworks.iter().map(|f| f.to_string()).collect();
            let (primary, layer) = if multi.len() > 1 {
                let (p, l) = resolve_primary(&multi);
                (Some(p), l)
            } else {
                (None, None)
            };

            for hit in &cmdline_hits {
                let mut row = Evidence::new(
                    workload_uid,
                    Source::Process,
                    SourceKind::Active,
                    hit.framework,
                    WorkloadKind::Training,
                    CMDLINE_CONFIDENCE,
                    serde_json::json!({"cmdline": proc.cmdline, "cwd": proc.cwd}),
                    now,
                );
                if multi.len() > 1 {
                    row.frameworks = Some(multi.clone());
                    if primary.as_deref() == Some(hit.framework) {
                        row.framework_layer = layer.clone();
                    }
                }
                evidence.push(row);
            }

            let env_blob = proc
                .env
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n");
            for hit in find_matches(&env_blob, ENV_PATTERNS) {
                // Already surfaced via the cmdline match for the same
                // framework; emitting it again under `process` would
                // double-count a single observation. An env-only signal
                // (no matching cmdline pattern) is emitted under its own
                // `env` source instead, so its distinct weight applies
                // without duplicating the framework hit (spec open
                // question, section 9).
                if matched_frameworks.contains(&hit.framework) {
                    continue;
                }
                evidence.push(Evidence::new(
                    workload_uid,
                    Source::Env,
                    SourceKind::Active,
                    hit.framework,
                    WorkloadKind::Training,
                    ENV_CONFIDENCE,
                    serde_json::json!({"env_signal": hit.needle}),
                    now,
                ));
            }
        }

        let count = evidence.len();
        Ok(ProbeOutcome {
            evidence,
            coverage: success_coverage(coverage, workload_uid, Source::Process, now, None, count),
        })
    }
}

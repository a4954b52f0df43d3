//! Log-window probe: scans log records in a Coordinator-supplied window
//! for pattern matches, deduplicating per (framework, pattern) so a
//! repeated log line doesn't inflate the vote count.

use super::patterns::{find_matches, CMDLINE_PATTERNS};
use super::{dispatch_allowed, failure_coverage, success_coverage, DispatchContext, ProbeExecutor, ProbeOutcome, ProbeParams};
use crate::error::Result;
use crate::interfaces::LogSource;
use crate::model::coverage::Coverage;
use crate::model::evidence::{Evidence, Source, SourceKind, WorkloadKind};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

pub struct LogProbe<L: LogSource> {
    source: Arc<L>,
}

impl<L: LogSource> LogProbe<L> {
    pub fn new(source: Arc<L>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<L: LogSource> ProbeExecutor for LogProbe<L> {
    fn source(&self) -> Source {
        Source::Log
    }

    fn is_dispatchable(&self, ctx: &DispatchContext) -> Option<ProbeParams> {
        if !dispatch_allowed(ctx.coverage, ctx.max_attempts) {
            return None;
        }
        let window = ctx.log_gap?;
        Some(ProbeParams { window: Some(window) })
    }

    async fn execute(
        &self,
        workload_uid: &str,
        coverage: Option<&Coverage>,
        params: ProbeParams,
    ) -> Result<ProbeOutcome> {
        let now = Utc::now();
        let window = match params.window {
            Some(w) => w,
            None => {
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: coverage
                        .cloned()
                        .unwrap_or_else(|| Coverage::new(workload_uid, Source::Log)),
                })
            }
        };

        let records = match self.source.fetch_window(workload_uid, window).await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: failure_coverage(coverage, workload_uid, Source::Log, now, e.to_string()),
                });
            }
        };

        let mut seen: HashSet<(&'static str, &'static str)> = HashSet::new();
        let mut evidence = Vec::new();
        for record in &records {
            for hit in find_matches(&record.line, CMDLINE_PATTERNS) {
                let key = (hit.framework, hit.needle);
                if !seen.insert(key) {
                    continue;
                }
                evidence.push(Evidence::new(
                    workload_uid,
                    Source::Log,
                    SourceKind::Passive,
                    hit.framework,
                    WorkloadKind::Training,
                    hit.base_confidence,
                    serde_json::json!({"line": record.line, "pattern": hit.needle}),
                    record.timestamp,
                ));
            }
        }

        // covered_to advances to min(window.to, log_available_to): the
        // probe only ever claims to have scanned what it was asked to
        // scan, never further than the log ingester says is available.
        let covered_to = match coverage.and_then(|c| c.log_available_to) {
            Some(available_to) => window.to.min(available_to),
            None => window.to,
        };
        let count = evidence.len();
        let mut updated = success_coverage(
            coverage,
            workload_uid,
            Source::Log,
            now,
            crate::model::coverage::Window::new(window.from, covered_to),
            count,
        );
        updated.covered_to = Some(covered_to);

        Ok(ProbeOutcome { evidence, coverage: updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::LogRecord;
    use crate::model::coverage::Window;
    use chrono::Duration;

    struct FakeLogSource {
        records: Vec<LogRecord>,
    }

    #[async_trait]
    impl LogSource for FakeLogSource {
        async fn fetch_window(
            &self,
            _workload_uid: &str,
            _window: Window,
        ) -> Result<Vec<LogRecord>> {
            Ok(self.records.clone())
        }
    }

    #[tokio::test]
    async fn deduplicates_repeated_pattern_within_window() {
        let now = Utc::now();
        let source = Arc::new(FakeLogSource {
            records: vec![
                LogRecord { timestamp: now, line: "using vllm engine".to_string() },
                LogRecord { timestamp: now + Duration::seconds(1), line: "vllm worker ready".to_string() },
            ],
        });
        let probe = LogProbe::new(source);
        let window = Window::new(now - Duration::minutes(1), now + Duration::minutes(1)).unwrap();
        let outcome = probe
            .execute("w1", None, ProbeParams { window: Some(window) })
            .await
            .unwrap();
        assert_eq!(outcome.evidence.len(), 1);
        assert_eq!(outcome.evidence[0].framework, "vllm");
    }

    #[tokio::test]
    async fn covered_to_caps_at_log_available_to() {
        let now = Utc::now();
        let source = Arc::new(FakeLogSource { records: vec![] });
        let probe = LogProbe::new(source);
        let mut coverage = Coverage::new("w1", Source::Log);
        coverage.log_available_to = Some(now);
        let window = Window::new(now - Duration::minutes(5), now + Duration::minutes(5)).unwrap();
        let outcome = probe
            .execute("w1", Some(&coverage), ProbeParams { window: Some(window) })
            .await
            .unwrap();
        assert_eq!(outcome.coverage.covered_to, Some(now));
    }
}

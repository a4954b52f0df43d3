//! Image probe: parses a pod's image reference into name and tag and
//! pattern-matches the name against known serving-framework images.

use super::patterns::{find_matches, IMAGE_PATTERNS};
use super::{dispatch_allowed, failure_coverage, success_coverage, DispatchContext, ProbeExecutor, ProbeOutcome, ProbeParams};
use crate::error::Result;
use crate::interfaces::PodInspector;
use crate::model::coverage::{Coverage, CoverageStatus};
use crate::model::evidence::{Evidence, Source, SourceKind, WorkloadKind};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const IMAGE_CONFIDENCE: f64 = 0.60;

pub struct ImageProbe<I: PodInspector> {
    inspector: Arc<I>,
}

impl<I: PodInspector> ImageProbe<I> {
    pub fn new(inspector: Arc<I>) -> Self {
        Self { inspector }
    }
}

/// Split `registry/repo/name:tag` (or `name@sha256:...`) into `(name, tag)`.
/// Only the final path segment is matched against the pattern registry —
/// registry hosts (`docker.io`, `ghcr.io`, ...) shouldn't influence
/// detection.
pub fn parse_image_reference(image: &str) -> (String, Option<String>) {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment = without_digest.rsplit('/').next().unwrap_or(without_digest);
    match last_segment.rsplit_once(':') {
        Some((name, tag)) => (name.to_string(), Some(tag.to_string())),
        None => (last_segment.to_string(), None),
    }
}

#[async_trait]
impl<I: PodInspector> ProbeExecutor for ImageProbe<I> {
    fn source(&self) -> Source {
        Source::Image
    }

    fn is_dispatchable(&self, ctx: &DispatchContext) -> Option<ProbeParams> {
        if !dispatch_allowed(ctx.coverage, ctx.max_attempts) {
            return None;
        }
        ctx.pod?;
        Some(ProbeParams::default())
    }

    async fn execute(
        &self,
        workload_uid: &str,
        coverage: Option<&Coverage>,
        _params: ProbeParams,
    ) -> Result<ProbeOutcome> {
        let now = Utc::now();
        let pod = match self.inspector.pod_status(workload_uid).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                let mut row = coverage
                    .cloned()
                    .unwrap_or_else(|| Coverage::new(workload_uid, Source::Image));
                let _ = row.transition_to(CoverageStatus::NotApplicable);
                return Ok(ProbeOutcome { evidence: Vec::new(), coverage: row });
            }
            Err(e) => {
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: failure_coverage(coverage, workload_uid, Source::Image, now, e.to_string()),
                });
            }
        };

        let evidence = match pod.image {
            Some(image_ref) => {
                let (name, _tag) = parse_image_reference(&image_ref);
                find_matches(&name, IMAGE_PATTERNS)
                    .into_iter()
                    .map(|hit| {
                        Evidence::new(
                            workload_uid,
                            Source::Image,
                            SourceKind::Active,
                            hit.framework,
                            WorkloadKind::Training,
                            IMAGE_CONFIDENCE,
                            serde_json::json!({"image": image_ref.clone()}),
                            now,
                        )
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let count = evidence.len();
        Ok(ProbeOutcome {
            evidence,
            coverage: success_coverage(coverage, workload_uid, Source::Image, now, None, count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::PodStatus;
    use std::collections::HashMap;

    struct FakeInspector {
        pod: Option<PodStatus>,
    }

    #[async_trait]
    impl PodInspector for FakeInspector {
        async fn pod_status(&self, _workload_uid: &str) -> Result<Option<PodStatus>> {
            Ok(self.pod.clone())
        }
        async fn process_tree(&self, _workload_uid: &str) -> Result<Vec<crate::interfaces::ProcessInfo>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn parses_registry_repo_name_and_tag() {
        let (name, tag) = parse_image_reference("registry.example.com/ml/vllm-server:v0.4.2");
        assert_eq!(name, "vllm-server");
        assert_eq!(tag.as_deref(), Some("v0.4.2"));
    }

    #[test]
    fn parses_bare_name_without_tag() {
        let (name, tag) = parse_image_reference("pytorch-worker");
        assert_eq!(name, "pytorch-worker");
        assert!(tag.is_none());
    }

    #[test]
    fn ignores_digest_suffix() {
        let (name, _) = parse_image_reference("ghcr.io/org/triton@sha256:abcdef");
        assert_eq!(name, "triton");
    }

    #[tokio::test]
    async fn emits_evidence_for_matching_image() {
        let inspector = Arc::new(FakeInspector {
            pod: Some(PodStatus {
                ready: true,
                running_since: None,
                image: Some("ghcr.io/org/tritonserver:24.01".to_string()),
                labels: HashMap::new(),
                annotations: HashMap::new(),
            }),
        });
        let probe = ImageProbe::new(inspector);
        let outcome = probe.execute("w1", None, ProbeParams::default()).await.unwrap();
        assert_eq!(outcome.evidence.len(), 1);
        assert_eq!(outcome.evidence[0].framework, "triton");
    }
}

//! Label probe: maps a pod's `app.kubernetes.io/name` label (plus any
//! operator-configured custom label/annotation keys) directly to a
//! candidate framework name. The weakest-evidence probe - no pattern
//! matching, just a lookup - hence the lowest priority and confidence.

use super::{dispatch_allowed, failure_coverage, success_coverage, DispatchContext, ProbeExecutor, ProbeOutcome, ProbeParams};
use crate::error::Result;
use crate::interfaces::{PodInspector, PodStatus};
use crate::model::coverage::{Coverage, CoverageStatus};
use crate::model::evidence::{Evidence, Source, SourceKind, WorkloadKind};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const LABEL_CONFIDENCE: f64 = 0.50;
const KUBERNETES_NAME_LABEL: &str = "app.kubernetes.io/name";

pub struct LabelProbe<I: PodInspector> {
    inspector: Arc<I>,
    custom_label_keys: Vec<String>,
    custom_annotation_keys: Vec<String>,
}

impl<I: PodInspector> LabelProbe<I> {
    pub fn new(
        inspector: Arc<I>,
        custom_label_keys: Vec<String>,
        custom_annotation_keys: Vec<String>,
    ) -> Self {
        Self { inspector, custom_label_keys, custom_annotation_keys }
    }

    fn candidates(&self, pod: &PodStatus) -> Vec<(&'static str, String)> {
        let mut hits = Vec::new();
        if let Some(v) = pod.labels.get(KUBERNETES_NAME_LABEL) {
            hits.push(("label:app.kubernetes.io/name", v.clone()));
        }
        for key in &self.custom_label_keys {
            if let Some(v) = pod.labels.get(key) {
                hits.push(("label", v.clone()));
            }
        }
        for key in &self.custom_annotation_keys {
            if let Some(v) = pod.annotations.get(key) {
                hits.push(("annotation", v.clone()));
            }
        }
        hits
    }
}

#[async_trait]
impl<I: PodInspector> ProbeExecutor for LabelProbe<I> {
    fn source(&self) -> Source {
        Source::Label
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
                    .unwrap_or_else(|| Coverage::new(workload_uid, Source::Label));
                let _ = row.transition_to(CoverageStatus::NotApplicable);
                return Ok(ProbeOutcome { evidence: Vec::new(), coverage: row });
            }
            Err(e) => {
                return Ok(ProbeOutcome {
                    evidence: Vec::new(),
                    coverage: failure_coverage(coverage, workload_uid, Source::Label, now, e.to_string()),
                });
            }
        };

        let evidence: Vec<Evidence> = self
            .candidates(&pod)
            .into_iter()
            .map(|(origin, framework)| {
                Evidence::new(
                    workload_uid,
                    Source::Label,
                    SourceKind::Active,
                    framework,
                    WorkloadKind::Training,
                    LABEL_CONFIDENCE,
                    serde_json::json!({"matched_via": origin}),
                    now,
                )
            })
            .collect();

        let count = evidence.len();
        Ok(ProbeOutcome {
            evidence,
            coverage: success_coverage(coverage, workload_uid, Source::Label, now, None, count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn emits_evidence_from_kubernetes_name_label() {
        let mut labels = HashMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), "pytorch".to_string());
        let inspector = Arc::new(FakeInspector {
            pod: Some(PodStatus {
                ready: true,
                running_since: None,
                image: None,
                labels,
                annotations: HashMap::new(),
            }),
        });
        let probe = LabelProbe::new(inspector, Vec::new(), Vec::new());
        let outcome = probe.execute("w1", None, ProbeParams::default()).await.unwrap();
        assert_eq!(outcome.evidence.len(), 1);
        assert_eq!(outcome.evidence[0].framework, "pytorch");
        assert_eq!(outcome.evidence[0].confidence, LABEL_CONFIDENCE);
    }

    #[tokio::test]
    async fn custom_annotation_key_also_yields_evidence() {
        let mut annotations = HashMap::new();
        annotations.insert("ml.example.com/framework".to_string(), "triton".to_string());
        let inspector = Arc::new(FakeInspector {
            pod: Some(PodStatus {
                ready: true,
                running_since: None,
                image: None,
                labels: HashMap::new(),
                annotations,
            }),
        });
        let probe = LabelProbe::new(
            inspector,
            Vec::new(),
            vec!["ml.example.com/framework".to_string()],
        );
        let outcome = probe.execute("w1", None, ProbeParams::default()).await.unwrap();
        assert_eq!(outcome.evidence.len(), 1);
        assert_eq!(outcome.evidence[0].framework, "triton");
    }

    #[tokio::test]
    async fn no_pod_record_marks_not_applicable() {
        let inspector = Arc::new(FakeInspector { pod: None });
        let probe = LabelProbe::new(inspector, Vec::new(), Vec::new());
        let outcome = probe.execute("w1", None, ProbeParams::default()).await.unwrap();
        assert!(outcome.evidence.is_empty());
        assert_eq!(outcome.coverage.status, CoverageStatus::NotApplicable);
    }
}

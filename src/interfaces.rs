//! Named external interfaces (spec section 1 & 6).
//!
//! HTTP routing, request binding, the Kubernetes client, GORM/DDL, and the
//! node-exporter RPC transport are explicitly out of scope — this module
//! gives their boundary a concrete shape (a trait or a plain struct/fn)
//! without implementing the collaborator itself. `PodInspector` stands in
//! for the node-exporter RPC transport; `LogSource` for whatever tails
//! container logs; the `*Request`/`*Response` structs are the JSON
//! payload shapes the (absent) HTTP layer would bind.

use crate::coverage::CoverageTracker;
use crate::evidence::EvidenceStore;
use crate::error::{Error, Result};
use crate::model::coverage::Window;
use crate::model::detection_state::DetectionState;
use crate::model::evidence::{
    Evidence, FrameworkLayer, FrameworkLayerKind, Source, SourceKind, WorkloadKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the Coordinator needs to know about a workload's primary pod to
/// gate probe dispatch (process must be Ready ≥ 30s; image/label probes
/// need a pod record at all).
#[derive(Debug, Clone)]
pub struct PodStatus {
    pub ready: bool,
    pub running_since: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

/// One process observed in a pod's process tree.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub env: HashMap<String, String>,
    pub cwd: String,
}

/// Stands in for the node-exporter RPC transport (spec section 1): pod
/// metadata and process-tree introspection for one workload's primary
/// pod. A transport failure here is the "Transient I/O" error kind from
/// spec section 7 — it marks coverage `failed`, not `not_applicable`.
#[async_trait]
pub trait PodInspector: Send + Sync {
    async fn pod_status(&self, workload_uid: &str) -> Result<Option<PodStatus>>;
    async fn process_tree(&self, workload_uid: &str) -> Result<Vec<ProcessInfo>>;
}

/// One line from a workload's container logs.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Log ingestion/retrieval transport, external to this crate.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_window(&self, workload_uid: &str, window: Window) -> Result<Vec<LogRecord>>;
}

/// JSON body of the evidence ingestion endpoint (spec section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceIngestionRequest {
    pub workload_uid: String,
    pub source: String,
    #[serde(rename = "source_type")]
    pub source_kind: RequestSourceKind,
    pub framework: String,
    #[serde(default)]
    pub frameworks: Option<Vec<String>>,
    pub workload_type: RequestWorkloadKind,
    pub confidence: f64,
    #[serde(default)]
    pub framework_layer: Option<RequestFrameworkLayerKind>,
    #[serde(default)]
    pub wrapper_framework: Option<String>,
    #[serde(default)]
    pub base_framework: Option<String>,
    #[serde(default = "default_evidence_payload")]
    pub evidence: serde_json::Value,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pattern_matched: Option<String>,
}

fn default_evidence_payload() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSourceKind {
    Passive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestWorkloadKind {
    Training,
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFrameworkLayerKind {
    Wrapper,
    Base,
}

/// Validate and append one evidence payload. Schema violations (missing
/// wrapper/base when `framework_layer` is set, confidence out of range)
/// are rejected rather than persisted — the 400 path of spec section 6.
pub fn ingest_evidence(
    store: &EvidenceStore,
    req: EvidenceIngestionRequest,
) -> Result<()> {
    if !(0.0..=1.0).contains(&req.confidence) {
        return Err(Error::Schema(format!(
            "confidence {} out of range [0, 1]",
            req.confidence
        )));
    }
    let framework_layer = match req.framework_layer {
        Some(RequestFrameworkLayerKind::Wrapper) | Some(RequestFrameworkLayerKind::Base) => {
            let wrapper = req
                .wrapper_framework
                .clone()
                .ok_or_else(|| Error::Schema("framework_layer set without wrapper_framework".into()))?;
            let base = req
                .base_framework
                .clone()
                .ok_or_else(|| Error::Schema("framework_layer set without base_framework".into()))?;
            let layer = match req.framework_layer {
                Some(RequestFrameworkLayerKind::Wrapper) => FrameworkLayerKind::Wrapper,
                _ => FrameworkLayerKind::Base,
            };
            Some(FrameworkLayer { layer, wrapper, base })
        }
        None => None,
    };

    let source = Source::parse(&req.source);
    let source_kind = match req.source_kind {
        RequestSourceKind::Passive => SourceKind::Passive,
        RequestSourceKind::Active => SourceKind::Active,
    };
    let workload_kind = match req.workload_type {
        RequestWorkloadKind::Training => WorkloadKind::Training,
        RequestWorkloadKind::Inference => WorkloadKind::Inference,
    };

    let mut evidence = Evidence::new(
        req.workload_uid,
        source,
        source_kind,
        req.framework,
        workload_kind,
        req.confidence,
        req.evidence,
        req.detected_at,
    );
    evidence.frameworks = req.frameworks;
    evidence.framework_layer = framework_layer;
    evidence.expires_at = req.expires_at;

    store.append(evidence);
    Ok(())
}

/// JSON body of the log-availability report endpoint (spec section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAvailabilityReport {
    pub workload_uid: String,
    pub detected_at: DateTime<Utc>,
    pub log_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub pattern_matched: Option<String>,
}

/// Updates `log_available_to = max(current, log_timestamp)` and, if a
/// framework is present, also ingests it as log-sourced evidence inline.
pub fn report_log_availability(
    coverage: &CoverageTracker,
    store: &EvidenceStore,
    report: LogAvailabilityReport,
) -> Result<()> {
    coverage.update_log_available(&report.workload_uid, report.log_timestamp);

    if let Some(framework) = report.framework {
        ingest_evidence(
            store,
            EvidenceIngestionRequest {
                workload_uid: report.workload_uid,
                source: "log".to_string(),
                source_kind: RequestSourceKind::Passive,
                framework,
                frameworks: None,
                workload_type: RequestWorkloadKind::Training,
                confidence: report.confidence.unwrap_or(0.75),
                framework_layer: None,
                wrapper_framework: None,
                base_framework: None,
                evidence: serde_json::json!({}),
                detected_at: report.detected_at,
                expires_at: None,
                pattern_matched: report.pattern_matched,
            },
        )?;
    }
    Ok(())
}

/// One namespace known to the cluster, as reported by the (out-of-scope)
/// namespace-info registry the Hourly Aggregator consults for backfill.
#[derive(Debug, Clone)]
pub struct NamespaceInfo {
    pub name: String,
}

/// One label dimension (e.g. `team=ml-platform`) the Hourly Aggregator
/// tracks per-cluster allocation for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelDimension {
    pub dim_type: String,
    pub dim_key: String,
    pub dim_value: String,
}

/// Stands in for the GPU-hours persistence layer (DB DDL/GORM facades are
/// out of scope): what hours already have rows, and what namespaces/label
/// dimensions exist, so backfill can compute a set difference rather than
/// re-deriving it from scratch every call.
pub trait HourlyPersistence: Send + Sync {
    fn cluster_hours(&self, cluster: &str) -> Vec<DateTime<Utc>>;
    fn namespace_hours(&self, cluster: &str, namespace: &str) -> Vec<DateTime<Utc>>;
    fn namespaces(&self, cluster: &str) -> Vec<NamespaceInfo>;
    fn label_dimensions(&self, cluster: &str) -> Vec<LabelDimension>;
    fn label_stats_exists(
        &self,
        cluster: &str,
        dim: &LabelDimension,
        hour: DateTime<Utc>,
    ) -> bool;
}

/// Response shape of `GET /detection/{workload_uid}` (spec section 6):
/// the current DetectionState plus up to the 50 most recent Evidence rows.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionQueryResponse {
    pub state: DetectionState,
    pub recent_evidence: Vec<Evidence>,
}

pub const DETECTION_QUERY_EVIDENCE_LIMIT: usize = 50;

pub fn detection_query(
    state: DetectionState,
    store: &EvidenceStore,
) -> DetectionQueryResponse {
    let recent_evidence = store.list_recent(&state.workload_uid, DETECTION_QUERY_EVIDENCE_LIMIT);
    DetectionQueryResponse {
        state,
        recent_evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_confidence_outside_unit_interval() {
        let store = EvidenceStore::new();
        let req = EvidenceIngestionRequest {
            workload_uid: "w1".into(),
            source: "wandb".into(),
            source_kind: RequestSourceKind::Passive,
            framework: "pytorch".into(),
            frameworks: None,
            workload_type: RequestWorkloadKind::Training,
            confidence: 1.5,
            framework_layer: None,
            wrapper_framework: None,
            base_framework: None,
            evidence: serde_json::json!({}),
            detected_at: Utc::now(),
            expires_at: None,
            pattern_matched: None,
        };
        assert!(ingest_evidence(&store, req).is_err());
    }

    #[test]
    fn log_availability_report_updates_coverage_and_ingests_evidence() {
        let coverage = CoverageTracker::new();
        let store = EvidenceStore::new();
        let now = Utc::now();
        let report = LogAvailabilityReport {
            workload_uid: "w1".into(),
            detected_at: now,
            log_timestamp: now,
            framework: Some("pytorch".into()),
            confidence: Some(0.8),
            pattern_matched: Some("import torch".into()),
        };
        report_log_availability(&coverage, &store, report).unwrap();

        assert_eq!(
            coverage.get("w1", Source::Log).unwrap().log_available_to,
            Some(now)
        );
        assert_eq!(store.count_for_workload("w1"), 1);
    }
}

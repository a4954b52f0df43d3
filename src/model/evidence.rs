//! Evidence: one observation from one source supporting (or contradicting)
//! a framework hypothesis for a workload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evidence source channel. Unknown source names resolve to `Default`
/// (see `Source::parse`), which carries the lowest trust weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Wandb,
    ImportDetection,
    Process,
    Env,
    Log,
    ActiveDetection,
    Image,
    Label,
    Default,
}

impl Source {
    /// Parse a source tag, falling back to `Default` for anything unknown.
    /// This is how the Evidence Aggregator's weight lookup behaves for
    /// unrecognized source names per spec section 4.E.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "wandb" => Source::Wandb,
            "import_detection" => Source::ImportDetection,
            "process" => Source::Process,
            "env" => Source::Env,
            "log" => Source::Log,
            "active_detection" => Source::ActiveDetection,
            "image" => Source::Image,
            "label" => Source::Label,
            _ => Source::Default,
        }
    }

    /// Canonical lowercase tag, as it would appear on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Wandb => "wandb",
            Source::ImportDetection => "import_detection",
            Source::Process => "process",
            Source::Env => "env",
            Source::Log => "log",
            Source::ActiveDetection => "active_detection",
            Source::Image => "image",
            Source::Label => "label",
            Source::Default => "default",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an evidence row came from a passive observation (logs, env,
/// reports) or an active probe the Coordinator dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Passive,
    Active,
}

/// Whether the workload is training or serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadKind {
    Training,
    Inference,
}

/// Which side of a wrapper/base relationship a framework name occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameworkLayerKind {
    Wrapper,
    Base,
}

/// Wrapper/base framework relationship, e.g. primus wrapping megatron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkLayer {
    pub layer: FrameworkLayerKind,
    pub wrapper: String,
    pub base: String,
}

/// One append-only observation from one source about one workload.
///
/// Append-only: the only field ever mutated in place is `processed`, via
/// `EvidenceStore::mark_processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Row identifier
    pub id: uuid::Uuid,
    /// Workload this observation is about
    pub workload_uid: String,
    /// Channel the observation arrived on
    pub source: Source,
    /// Passive report vs. active probe dispatch
    pub source_kind: SourceKind,
    /// Candidate framework name (e.g. "pytorch")
    pub framework: String,
    /// Optional parallel list of candidate frameworks (multi-hypothesis
    /// observations, e.g. a log line matching more than one pattern)
    pub frameworks: Option<Vec<String>>,
    /// Training vs. inference
    pub workload_kind: WorkloadKind,
    /// Observation strength in [0, 1]
    pub confidence: f64,
    /// Wrapper/base relationship, if this observation identified one
    pub framework_layer: Option<FrameworkLayer>,
    /// Opaque source-specific payload (raw matched text, process info, ...)
    pub evidence: serde_json::Value,
    /// When this observation was made
    pub detected_at: DateTime<Utc>,
    /// Optional expiry after which `EvidenceStore::delete_expired` removes it
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the Evidence Aggregator has consumed this row
    pub processed: bool,
}

impl Evidence {
    /// Build a new, unprocessed evidence row with a fresh id
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workload_uid: impl Into<String>,
        source: Source,
        source_kind: SourceKind,
        framework: impl Into<String>,
        workload_kind: WorkloadKind,
        confidence: f64,
        evidence: serde_json::Value,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            workload_uid: workload_uid.into(),
            source,
            source_kind,
            framework: framework.into(),
            frameworks: None,
            workload_kind,
            confidence,
            framework_layer: None,
            evidence,
            detected_at,
            expires_at: None,
            processed: false,
        }
    }
}

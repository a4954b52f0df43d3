//! Workload identity
//!
//! A Workload is discovered and owned by an external component; the
//! detection engine only ever reads it by reference (`workload_uid`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered AI training or inference job.
///
/// Created by external workload discovery; never mutated by this crate.
/// Destruction is deferred until all owned evidence has expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    /// Unique, stable identifier
    pub uid: String,
    /// Kubernetes namespace the workload runs in
    pub namespace: String,
    /// Name of the primary pod backing this workload
    pub pod_name: String,
    /// When the workload was first observed
    pub created_at: DateTime<Utc>,
    /// Set once the workload has terminated
    pub terminal: bool,
}

impl Workload {
    /// Construct a freshly discovered, non-terminal workload
    pub fn new(uid: impl Into<String>, namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            created_at: Utc::now(),
            terminal: false,
        }
    }
}

//! Backfill gap-finder and drivers for the Hourly Aggregator: given a time
//! range, work out which (hour, scope) pairs are missing from persistence
//! and compute only those, excluding the live wall-clock hour so backfill
//! never races the live aggregator.

use super::{compute_cluster_hour, compute_label_hour, compute_namespace_hour, hour_floor, HourlyAllocation, WorkloadSpan};
use crate::interfaces::HourlyPersistence;
use chrono::{DateTime, Duration, Utc};

const SYSTEM_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

/// All hour boundaries in `[start, end]` inclusive, floored to the hour.
pub fn hour_boundaries(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let start = hour_floor(start);
    let end = hour_floor(end);
    if start > end {
        return Vec::new();
    }
    let mut hours = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        hours.push(cursor);
        cursor += Duration::hours(1);
    }
    hours
}

/// Set difference between the requested range's hours and what already
/// has a persisted row.
pub fn missing_hours(
    existing: &[DateTime<Utc>],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    hour_boundaries(start, end)
        .into_iter()
        .filter(|h| !existing.contains(h))
        .collect()
}

/// The current wall-clock hour is always excluded from backfill:
/// `end = floor(now, 1h) - 1h`.
pub fn backfill_window_end(now: DateTime<Utc>) -> DateTime<Utc> {
    hour_floor(now) - Duration::hours(1)
}

fn capped_end(requested_end: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    requested_end.min(backfill_window_end(now))
}

/// Backfill the cluster-scope dimension: one row per missing hour.
pub fn backfill_cluster(
    persistence: &dyn HourlyPersistence,
    workloads: &[WorkloadSpan],
    cluster: &str,
    total_capacity: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<HourlyAllocation> {
    let end = capped_end(end, now);
    let existing = persistence.cluster_hours(cluster);
    missing_hours(&existing, start, end)
        .into_iter()
        .map(|h| compute_cluster_hour(workloads, cluster, total_capacity, h))
        .collect()
}

/// Backfill the namespace-scope dimension: the cross product of (missing
/// hours, namespaces known to the cluster minus system-namespace
/// exclusions).
pub fn backfill_namespaces(
    persistence: &dyn HourlyPersistence,
    workloads: &[WorkloadSpan],
    cluster: &str,
    total_capacity: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    excluded_namespaces: &[String],
    include_system_namespaces: bool,
) -> Vec<HourlyAllocation> {
    let end = capped_end(end, now);
    let hours = hour_boundaries(start, end);
    let mut results = Vec::new();

    for ns in persistence.namespaces(cluster) {
        if !include_system_namespaces
            && (SYSTEM_NAMESPACES.contains(&ns.name.as_str())
                || excluded_namespaces.iter().any(|e| e == &ns.name))
        {
            continue;
        }
        let existing = persistence.namespace_hours(cluster, &ns.name);
        for h in hours.iter().filter(|h| !existing.contains(h)) {
            results.push(compute_namespace_hour(workloads, cluster, &ns.name, total_capacity, *h));
        }
    }
    results
}

/// Backfill the label-dimension scope. Rerunnable: each (dimension, hour)
/// row is checked individually via `LabelStatsExists` rather than via a
/// bulk existing-hours list, since dimensions can be added between runs.
/// Disables itself silently if the persistence layer reports no label
/// dimensions at all (spec section 7: empty key config is a silent no-op).
pub fn backfill_labels(
    persistence: &dyn HourlyPersistence,
    workloads: &[WorkloadSpan],
    cluster: &str,
    total_capacity: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<HourlyAllocation> {
    let end = capped_end(end, now);
    let hours = hour_boundaries(start, end);
    let dims = persistence.label_dimensions(cluster);
    if dims.is_empty() {
        return Vec::new();
    }

    let mut results = Vec::new();
    for dim in &dims {
        for h in &hours {
            if persistence.label_stats_exists(cluster, dim, *h) {
                continue;
            }
            results.push(compute_label_hour(
                workloads,
                cluster,
                &dim.dim_key,
                &dim.dim_value,
                total_capacity,
                *h,
            ));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{LabelDimension, NamespaceInfo};
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn hour(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    struct FakePersistence {
        cluster: Vec<DateTime<Utc>>,
        namespaces: Vec<NamespaceInfo>,
        namespace_hours: Mutex<Vec<DateTime<Utc>>>,
        label_dims: Vec<LabelDimension>,
        existing_label_rows: Vec<(LabelDimension, DateTime<Utc>)>,
    }

    impl HourlyPersistence for FakePersistence {
        fn cluster_hours(&self, _cluster: &str) -> Vec<DateTime<Utc>> {
            self.cluster.clone()
        }
        fn namespace_hours(&self, _cluster: &str, _namespace: &str) -> Vec<DateTime<Utc>> {
            self.namespace_hours.lock().unwrap().clone()
        }
        fn namespaces(&self, _cluster: &str) -> Vec<NamespaceInfo> {
            self.namespaces.clone()
        }
        fn label_dimensions(&self, _cluster: &str) -> Vec<LabelDimension> {
            self.label_dims.clone()
        }
        fn label_stats_exists(&self, _cluster: &str, dim: &LabelDimension, hour: DateTime<Utc>) -> bool {
            self.existing_label_rows.iter().any(|(d, h)| d == dim && *h == hour)
        }
    }

    #[test]
    fn missing_hours_matches_spec_scenario_5() {
        let existing = vec![hour(2025, 1, 1, 10), hour(2025, 1, 1, 12)];
        let start = hour(2025, 1, 1, 10);
        let end = hour(2025, 1, 1, 13);
        let missing = missing_hours(&existing, start, end);
        assert_eq!(missing, vec![hour(2025, 1, 1, 11), hour(2025, 1, 1, 13)]);
    }

    #[test]
    fn backfill_window_excludes_current_hour() {
        let now = hour(2025, 1, 1, 14) + Duration::minutes(25);
        let end = backfill_window_end(now);
        assert_eq!(end, hour(2025, 1, 1, 13));
        assert!(end + Duration::hours(1) <= hour_floor(now));
    }

    #[test]
    fn backfill_cluster_skips_existing_hours_and_excludes_live_hour() {
        let persistence = FakePersistence {
            cluster: vec![hour(2025, 1, 1, 10)],
            namespaces: Vec::new(),
            namespace_hours: Mutex::new(Vec::new()),
            label_dims: Vec::new(),
            existing_label_rows: Vec::new(),
        };
        let now = hour(2025, 1, 1, 12) + Duration::minutes(10);
        let rows = backfill_cluster(
            &persistence,
            &[],
            "c1",
            8.0,
            hour(2025, 1, 1, 10),
            hour(2025, 1, 1, 13),
            now,
        );
        let produced: Vec<DateTime<Utc>> = rows.iter().map(|r| r.stat_hour).collect();
        assert_eq!(produced, vec![hour(2025, 1, 1, 11)]);
    }

    #[test]
    fn backfill_namespaces_excludes_system_namespaces_by_default() {
        let persistence = FakePersistence {
            cluster: Vec::new(),
            namespaces: vec![
                NamespaceInfo { name: "kube-system".to_string() },
                NamespaceInfo { name: "team-a".to_string() },
            ],
            namespace_hours: Mutex::new(Vec::new()),
            label_dims: Vec::new(),
            existing_label_rows: Vec::new(),
        };
        let now = hour(2025, 1, 1, 11) + Duration::minutes(1);
        let rows = backfill_namespaces(
            &persistence,
            &[],
            "c1",
            8.0,
            hour(2025, 1, 1, 10),
            hour(2025, 1, 1, 10),
            now,
            &[],
            false,
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn backfill_labels_is_rerunnable_via_existence_check() {
        let dim = LabelDimension {
            dim_type: "team".to_string(),
            dim_key: "team".to_string(),
            dim_value: "ml-platform".to_string(),
        };
        let persistence = FakePersistence {
            cluster: Vec::new(),
            namespaces: Vec::new(),
            namespace_hours: Mutex::new(Vec::new()),
            label_dims: vec![dim.clone()],
            existing_label_rows: vec![(dim, hour(2025, 1, 1, 10))],
        };
        let now = hour(2025, 1, 1, 12) + Duration::minutes(1);
        let rows = backfill_labels(
            &persistence,
            &[],
            "c1",
            8.0,
            hour(2025, 1, 1, 10),
            hour(2025, 1, 1, 11),
            now,
        );
        // hour 10 already has a row; only hour 11 should be produced.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stat_hour, hour(2025, 1, 1, 11));
    }

    #[test]
    fn backfill_labels_disables_silently_with_no_dimensions() {
        let persistence = FakePersistence {
            cluster: Vec::new(),
            namespaces: Vec::new(),
            namespace_hours: Mutex::new(Vec::new()),
            label_dims: Vec::new(),
            existing_label_rows: Vec::new(),
        };
        let now = hour(2025, 1, 1, 12) + Duration::minutes(1);
        let rows = backfill_labels(&persistence, &[], "c1", 8.0, hour(2025, 1, 1, 10), hour(2025, 1, 1, 11), now);
        assert!(rows.is_empty());
    }
}

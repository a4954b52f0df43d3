//! Hourly Aggregator (spec component H): time-weighted GPU allocation
//! computed per hour across the cluster, namespace, and label dimensions.
//!
//! Metric collection transport is out of scope (metrics arrive
//! pre-ingested): [`WorkloadSpan`] carries a single pre-computed
//! utilization reading per workload rather than a time series.

pub mod backfill;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workload's GPU allocation over its lifetime, as seen by the hourly
/// aggregator. `ended_at = None` means still running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpan {
    pub uid: String,
    pub cluster: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub gpu_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Pre-ingested GPU utilization percentage for this workload,
    /// representative of the hour being aggregated.
    pub utilization_pct: f64,
}

/// Time-weighted GPU-hour summary for one hour at one scope (spec
/// section 3's `HourlyAllocation` entity).
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyAllocation {
    pub stat_hour: DateTime<Utc>,
    pub total_capacity: f64,
    pub allocated_gpu_count: f64,
    pub allocation_rate_pct: f64,
    pub utilization_min: f64,
    pub utilization_max: f64,
    pub utilization_avg: f64,
    pub utilization_p50: f64,
    pub utilization_p95: f64,
    pub active_workload_count: usize,
    pub sample_count: usize,
}

/// Floor a timestamp to the start of its UTC hour (minute/second/
/// nanosecond zeroed) — the `stat_hour` invariant from spec section 3.
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("zeroing minute/second/nanosecond is always valid")
}

/// Seconds of overlap between a workload's lifetime and the hour window
/// `[hour, hour + 1h)`.
fn overlap_seconds(span: &WorkloadSpan, hour: DateTime<Utc>) -> f64 {
    let hour_end = hour + Duration::hours(1);
    let start = span.started_at.max(hour);
    let end = span.ended_at.unwrap_or(hour_end).min(hour_end);
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

/// Nearest-rank percentile over an already-sorted slice. `p` in [0, 100].
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn summarize(
    hour: DateTime<Utc>,
    total_capacity: f64,
    contributing: &[&WorkloadSpan],
) -> HourlyAllocation {
    let allocated_gpu_count: f64 = contributing
        .iter()
        .map(|w| overlap_seconds(w, hour) / 3600.0 * w.gpu_count as f64)
        .sum();

    let mut utilizations: Vec<f64> = contributing.iter().map(|w| w.utilization_pct).collect();
    utilizations.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let (min, max, avg) = if utilizations.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = utilizations.iter().sum();
        (utilizations[0], *utilizations.last().unwrap(), sum / utilizations.len() as f64)
    };

    HourlyAllocation {
        stat_hour: hour_floor(hour),
        total_capacity,
        allocated_gpu_count,
        allocation_rate_pct: if total_capacity > 0.0 {
            (allocated_gpu_count / total_capacity) * 100.0
        } else {
            0.0
        },
        utilization_min: min,
        utilization_max: max,
        utilization_avg: avg,
        utilization_p50: percentile(&utilizations, 50.0),
        utilization_p95: percentile(&utilizations, 95.0),
        active_workload_count: contributing.len(),
        sample_count: utilizations.len(),
    }
}

/// Workloads overlapping `[hour, hour + 1h)`.
fn overlapping<'a>(workloads: &'a [WorkloadSpan], hour: DateTime<Utc>) -> Vec<&'a WorkloadSpan> {
    let hour_end = hour + Duration::hours(1);
    workloads
        .iter()
        .filter(|w| w.started_at < hour_end && w.ended_at.unwrap_or(hour_end) > hour)
        .collect()
}

/// Cluster-scope hourly allocation: all workloads in the cluster.
pub fn compute_cluster_hour(
    workloads: &[WorkloadSpan],
    cluster: &str,
    total_capacity: f64,
    hour: DateTime<Utc>,
) -> HourlyAllocation {
    let contributing: Vec<&WorkloadSpan> = overlapping(workloads, hour)
        .into_iter()
        .filter(|w| w.cluster == cluster)
        .collect();
    summarize(hour, total_capacity, &contributing)
}

/// Namespace-scope hourly allocation.
pub fn compute_namespace_hour(
    workloads: &[WorkloadSpan],
    cluster: &str,
    namespace: &str,
    total_capacity: f64,
    hour: DateTime<Utc>,
) -> HourlyAllocation {
    let contributing: Vec<&WorkloadSpan> = overlapping(workloads, hour)
        .into_iter()
        .filter(|w| w.cluster == cluster && w.namespace == namespace)
        .collect();
    summarize(hour, total_capacity, &contributing)
}

/// Label-dimension-scope hourly allocation: workloads whose labels carry
/// `dim_key = dim_value`.
pub fn compute_label_hour(
    workloads: &[WorkloadSpan],
    cluster: &str,
    dim_key: &str,
    dim_value: &str,
    total_capacity: f64,
    hour: DateTime<Utc>,
) -> HourlyAllocation {
    let contributing: Vec<&WorkloadSpan> = overlapping(workloads, hour)
        .into_iter()
        .filter(|w| w.cluster == cluster && w.labels.get(dim_key).map(|v| v.as_str()) == Some(dim_value))
        .collect();
    summarize(hour, total_capacity, &contributing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn span(uid: &str, gpu_count: u32, start: DateTime<Utc>, end: Option<DateTime<Utc>>, util: f64) -> WorkloadSpan {
        WorkloadSpan {
            uid: uid.to_string(),
            cluster: "c1".to_string(),
            namespace: "ns1".to_string(),
            labels: HashMap::new(),
            gpu_count,
            started_at: start,
            ended_at: end,
            utilization_pct: util,
        }
    }

    #[test]
    fn hour_floor_zeros_minute_second_nanosecond() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 10, 42, 17).unwrap();
        let floored = hour_floor(ts);
        assert_eq!(floored.minute(), 0);
        assert_eq!(floored.second(), 0);
        assert_eq!(floored.nanosecond(), 0);
    }

    #[test]
    fn full_hour_occupancy_yields_full_gpu_hours() {
        let h = hour(2025, 1, 1, 10);
        let workloads = vec![span("w1", 4, h, Some(h + Duration::hours(1)), 50.0)];
        let result = compute_cluster_hour(&workloads, "c1", 8.0, h);
        assert!((result.allocated_gpu_count - 4.0).abs() < 1e-9);
        assert_eq!(result.active_workload_count, 1);
    }

    #[test]
    fn partial_overlap_is_time_weighted() {
        let h = hour(2025, 1, 1, 10);
        // Running for only the first half of the hour.
        let workloads = vec![span("w1", 8, h, Some(h + Duration::minutes(30)), 60.0)];
        let result = compute_cluster_hour(&workloads, "c1", 8.0, h);
        assert!((result.allocated_gpu_count - 4.0).abs() < 1e-9);
    }

    #[test]
    fn namespace_scope_excludes_other_namespaces() {
        let h = hour(2025, 1, 1, 10);
        let mut other = span("w2", 2, h, Some(h + Duration::hours(1)), 10.0);
        other.namespace = "other".to_string();
        let workloads = vec![span("w1", 4, h, Some(h + Duration::hours(1)), 50.0), other];
        let result = compute_namespace_hour(&workloads, "c1", "ns1", 8.0, h);
        assert_eq!(result.active_workload_count, 1);
    }

    #[test]
    fn label_scope_matches_on_key_value_pair() {
        let h = hour(2025, 1, 1, 10);
        let mut labeled = span("w1", 4, h, Some(h + Duration::hours(1)), 50.0);
        labeled.labels.insert("team".to_string(), "ml-platform".to_string());
        let unlabeled = span("w2", 2, h, Some(h + Duration::hours(1)), 20.0);
        let workloads = vec![labeled, unlabeled];
        let result = compute_label_hour(&workloads, "c1", "team", "ml-platform", 8.0, h);
        assert_eq!(result.active_workload_count, 1);
    }
}

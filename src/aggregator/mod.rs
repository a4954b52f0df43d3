//! Evidence Aggregator (spec component E): weighted multi-source fusion
//! of Evidence rows into a framework hypothesis, confidence score, status,
//! and conflict list.
//!
//! Source weight (trust in the channel) is kept separate from observation
//! confidence (strength of the signal): this is what lets the multi-source
//! bonus stay small and bounded without masking a strong contradictor, and
//! what lets new sources be added without destabilizing old scores.

use crate::config::AggregatorConfig;
use crate::evidence::EvidenceStore;
use crate::model::detection_state::{Conflict, DetectionState, DetectionStatus};
use crate::model::evidence::{Evidence, FrameworkLayer, Source, WorkloadKind};
use crate::probes::priority::resolve_primary;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Fixed per-source trust weights from spec section 4.E. Unknown source
/// names resolve to `Source::Default` before reaching this table.
fn default_weights() -> HashMap<Source, f64> {
    use Source::*;
    HashMap::from([
        (Wandb, 1.00),
        (ImportDetection, 0.95),
        (Process, 0.85),
        (Env, 0.80),
        (Log, 0.75),
        (ActiveDetection, 0.70),
        (Image, 0.60),
        (Label, 0.50),
        (Default, 0.30),
    ])
}

/// Multiplicative rate in the multi-source confidence bonus:
/// `min(cap, rate * (vote_count - 1))`. The rate itself is not spec'd as
/// configurable, only the cap is (`AggregatorConfig::multi_source_bonus_cap`).
const MULTI_SOURCE_BONUS_RATE: f64 = 0.05;

struct Vote {
    total_score: f64,
    vote_count: u32,
    highest_confidence: f64,
    sources: Vec<Source>,
    primary_source: Source,
    layer: Option<FrameworkLayer>,
    workload_kind: WorkloadKind,
}

/// Outcome of one aggregation pass.
pub struct AggregationOutcome {
    pub state: DetectionState,
    /// ids of evidence rows consumed this pass, for the caller to mark
    /// processed (the aggregator does this itself via `EvidenceStore`,
    /// but callers that need the set for logging can use this).
    pub consumed_evidence_ids: Vec<uuid::Uuid>,
}

pub struct Aggregator {
    weights: HashMap<Source, f64>,
    conflict_ratio: f64,
    multi_source_bonus_cap: f64,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        let mut weights = default_weights();
        for (name, weight) in &config.weight_overrides {
            weights.insert(Source::parse(name), *weight);
        }
        Self {
            weights,
            conflict_ratio: config.conflict_ratio,
            multi_source_bonus_cap: config.multi_source_bonus_cap,
        }
    }

    fn weight(&self, source: Source) -> f64 {
        self.weights
            .get(&source)
            .copied()
            .unwrap_or_else(|| self.weights[&Source::Default])
    }

    /// Run one aggregation pass for `workload_uid` against `existing`
    /// state (the Coordinator's persisted row), consuming unprocessed
    /// evidence from `store`. If there is no unprocessed evidence, returns
    /// `existing` unchanged — running the Aggregator twice in a row with
    /// no new evidence is idempotent.
    pub fn aggregate(
        &self,
        workload_uid: &str,
        store: &EvidenceStore,
        existing: DetectionState,
        now: DateTime<Utc>,
    ) -> AggregationOutcome {
        let rows = store.list_unprocessed(workload_uid);
        if rows.is_empty() {
            return AggregationOutcome {
                state: existing,
                consumed_evidence_ids: Vec::new(),
            };
        }

        let votes = self.tally(&rows);
        let (winner_fw, winner) = self.select_winner(&votes);
        let conflicts = self.detect_conflicts(&votes, &winner_fw, winner);

        let final_confidence =
            (winner.highest_confidence
                + (MULTI_SOURCE_BONUS_RATE * (winner.vote_count as f64 - 1.0))
                    .min(self.multi_source_bonus_cap))
            .min(1.0);

        let status = if !conflicts.is_empty() {
            DetectionStatus::Conflict
        } else if final_confidence >= 0.80 {
            DetectionStatus::Verified
        } else if final_confidence >= 0.60 {
            DetectionStatus::Confirmed
        } else if final_confidence >= 0.40 {
            DetectionStatus::Suspected
        } else {
            DetectionStatus::Unknown
        };

        let mut sources: Vec<String> = winner.sources.iter().map(|s| s.as_str().to_string()).collect();
        sources.sort();
        sources.dedup();

        let was_already_confirmed = matches!(
            existing.status,
            DetectionStatus::Confirmed | DetectionStatus::Verified
        );
        let confirmed_at = match (
            matches!(status, DetectionStatus::Confirmed | DetectionStatus::Verified),
            was_already_confirmed,
        ) {
            (true, true) => existing.confirmed_at,
            (true, false) => Some(now),
            (false, _) => None, // status regressed out of confirmed/verified
        };

        let ids: Vec<uuid::Uuid> = rows.iter().map(|e| e.id).collect();
        store.mark_processed(&ids);

        let state = DetectionState {
            workload_uid: workload_uid.to_string(),
            framework: Some(winner_fw.clone()),
            frameworks: {
                let mut fws: Vec<String> = votes.keys().cloned().collect();
                fws.sort();
                fws
            },
            workload_kind: Some(winner.workload_kind),
            confidence: final_confidence,
            status,
            evidence_count: store.count_for_workload(workload_uid),
            sources,
            conflicts,
            updated_at: now,
            confirmed_at,
            ..existing
        };

        AggregationOutcome {
            state,
            consumed_evidence_ids: ids,
        }
    }

    fn tally(&self, rows: &[Evidence]) -> HashMap<String, Vote> {
        let mut votes: HashMap<String, Vote> = HashMap::new();
        for e in rows {
            let (framework, layer) = self.effective_framework(e);
            let weight = self.weight(e.source);
            let vote = votes.entry(framework).or_insert_with(|| Vote {
                total_score: 0.0,
                vote_count: 0,
                highest_confidence: 0.0,
                sources: Vec::new(),
                primary_source: e.source,
                layer: None,
                workload_kind: e.workload_kind,
            });
            vote.total_score += weight * e.confidence;
            vote.vote_count += 1;
            if !vote.sources.contains(&e.source) {
                vote.sources.push(e.source);
            }
            if e.confidence > vote.highest_confidence {
                vote.highest_confidence = e.confidence;
                vote.primary_source = e.source;
                vote.layer = layer;
                vote.workload_kind = e.workload_kind;
            }
        }
        votes
    }

    /// The framework an evidence row actually votes for and the
    /// wrapper/base layer it carries. When a row names more than one
    /// candidate framework (`evidence.frameworks`, e.g. a cmdline match
    /// that fired on both a wrapper and its base), spec 4.G's priority
    /// list resolves which one is primary rather than voting for
    /// `evidence.framework` verbatim. A row with an explicit
    /// `framework_layer` already set (e.g. from the ingestion endpoint)
    /// is trusted as-is.
    fn effective_framework(&self, e: &Evidence) -> (String, Option<FrameworkLayer>) {
        if e.framework_layer.is_some() {
            return (e.framework.clone(), e.framework_layer.clone());
        }
        match &e.frameworks {
            Some(candidates) if candidates.len() > 1 => {
                let mut all = candidates.clone();
                if !all.contains(&e.framework) {
                    all.push(e.framework.clone());
                }
                resolve_primary(&all)
            }
            _ => (e.framework.clone(), None),
        }
    }

    /// Winner = max total_score; ties broken by higher highest_confidence,
    /// then by lexicographically smaller sorted source list.
    fn select_winner<'a>(&self, votes: &'a HashMap<String, Vote>) -> (String, &'a Vote) {
        let mut best: Option<(&String, &Vote)> = None;
        for (fw, vote) in votes {
            best = Some(match best {
                None => (fw, vote),
                Some((best_fw, best_vote)) => {
                    if vote.total_score > best_vote.total_score {
                        (fw, vote)
                    } else if vote.total_score < best_vote.total_score {
                        (best_fw, best_vote)
                    } else if vote.highest_confidence > best_vote.highest_confidence {
                        (fw, vote)
                    } else if vote.highest_confidence < best_vote.highest_confidence {
                        (best_fw, best_vote)
                    } else if sorted_source_names(vote) < sorted_source_names(best_vote) {
                        (fw, vote)
                    } else {
                        (best_fw, best_vote)
                    }
                }
            });
        }
        let (fw, vote) = best.expect("tally is only called with non-empty rows");
        (fw.clone(), vote)
    }

    /// Runner-up frameworks whose score is within `conflict_ratio` of the
    /// winner's and whose primary source the winner's source set doesn't
    /// already subsume.
    fn detect_conflicts(
        &self,
        votes: &HashMap<String, Vote>,
        winner_fw: &str,
        winner: &Vote,
    ) -> Vec<Conflict> {
        let threshold = self.conflict_ratio * winner.total_score;
        let mut conflicts: Vec<Conflict> = votes
            .iter()
            .filter(|(fw, _)| fw.as_str() != winner_fw)
            .filter(|(_, v)| v.total_score >= threshold)
            .filter(|(_, v)| !winner.sources.contains(&v.primary_source))
            .map(|(fw, v)| Conflict {
                framework: fw.clone(),
                total_score: v.total_score,
                primary_source: v.primary_source.as_str().to_string(),
            })
            .collect();
        conflicts.sort_by(|a, b| a.framework.cmp(&b.framework));
        conflicts
    }
}

fn sorted_source_names(vote: &Vote) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = vote.sources.iter().map(|s| s.as_str()).collect();
    names.sort();
    names
}

//! Hyperparameter Extractor (spec component B): a pure function from
//! parsed TensorBoard events to categorized hyperparameters.
//!
//! Only events with `step == 0` are considered — hyperparameters are
//! logged once, at the start of a run, not on every step.

use crate::model::hparam::{CategorizedHParams, HParam, HParamCategory, HParamValue, ParsedEvent};

/// Substrings (case-insensitive) that mark a scalar tag as a
/// hyperparameter rather than a training metric.
const HPARAM_KEYWORDS: &[&str] = &[
    "learning_rate",
    "lr",
    "batch_size",
    "hidden",
    "layers",
    "optimizer",
    "weight_decay",
    "parallel",
    "precision",
];

const TEXT_SUMMARY_SUFFIX: &str = "/text_summary";

/// Extract categorized hyperparameters from a batch of parsed events.
pub fn extract(events: &[ParsedEvent]) -> CategorizedHParams {
    let mut result: CategorizedHParams = CategorizedHParams::new();

    for event in events.iter().filter(|e| e.step == 0) {
        for (tag, text) in &event.texts {
            if let Some(key) = tag.strip_suffix(TEXT_SUMMARY_SUFFIX) {
                let value = HParamValue::parse_cascade(text);
                insert(&mut result, key, value);
            }
        }
        for (tag, scalar) in &event.scalars {
            let lower = tag.to_ascii_lowercase();
            if HPARAM_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                insert(&mut result, tag, HParamValue::Float(*scalar as f64));
            }
        }
    }

    result
}

fn insert(result: &mut CategorizedHParams, key: &str, value: HParamValue) {
    let category = categorize(key);
    result.entry(category).or_default().insert(
        key.to_string(),
        HParam {
            key: key.to_string(),
            value,
            category,
        },
    );
}

/// First-match-wins category assignment, in the fixed order
/// training -> model -> parallel -> optimizer -> precision -> data ->
/// checkpoint -> other.
fn categorize(key: &str) -> HParamCategory {
    let lower = key.to_ascii_lowercase();

    const TRAINING: &[&str] = &[
        "epoch", "max_steps", "train_steps", "num_train", "warmup", "grad_accum",
        "gradient_accumulation", "seed", "total_steps",
    ];
    const MODEL: &[&str] = &[
        "hidden", "layers", "heads", "embed", "vocab", "d_model", "num_layers", "model_size",
    ];
    const PARALLEL: &[&str] = &[
        "parallel", "world_size", "rank", "num_gpus", "nodes", "shard",
    ];
    const OPTIMIZER: &[&str] = &[
        "optimizer", "weight_decay", "learning_rate", "lr", "beta1", "beta2", "momentum", "adam",
        "sgd",
    ];
    const PRECISION: &[&str] = &["precision", "fp16", "bf16", "fp32", "amp", "mixed_precision"];
    const DATA: &[&str] = &["batch_size", "dataset", "data_path", "num_workers", "shuffle"];
    const CHECKPOINT: &[&str] = &["checkpoint", "ckpt", "save_steps", "resume"];

    if TRAINING.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Training
    } else if MODEL.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Model
    } else if PARALLEL.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Parallel
    } else if OPTIMIZER.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Optimizer
    } else if PRECISION.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Precision
    } else if DATA.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Data
    } else if CHECKPOINT.iter().any(|kw| lower.contains(kw)) {
        HParamCategory::Checkpoint
    } else {
        HParamCategory::Other
    }
}

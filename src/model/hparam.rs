//! Dynamic-typed hyperparameter values and a decoded TensorBoard event.
//!
//! A `HParamValue` is a deliberate sum type rather than a reflection-based
//! guess: `text_summary` tags arrive as a single text field that can
//! encode a bool, an integer, a float, a JSON object, or just text, and
//! the parse order below is the single source of truth for which type
//! wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dynamically typed hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
    Text(String),
}

impl HParamValue {
    /// Parse a raw `text_summary` string value following the deterministic
    /// cascade from spec section 4.B: null, bool, int64, float64,
    /// JSON-object, then plain text. The first successful parse wins.
    pub fn parse_cascade(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.eq_ignore_ascii_case("null") {
            return HParamValue::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return HParamValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return HParamValue::Bool(false);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return HParamValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return HParamValue::Float(f);
        }
        if trimmed.starts_with('{') {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
                if v.is_object() {
                    return HParamValue::Json(v);
                }
            }
        }
        HParamValue::Text(raw.to_string())
    }
}

/// Category a hyperparameter key is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HParamCategory {
    Training,
    Model,
    Parallel,
    Optimizer,
    Precision,
    Data,
    Checkpoint,
    Other,
}

/// A single extracted hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HParam {
    pub key: String,
    pub value: HParamValue,
    pub category: HParamCategory,
}

/// Map of category -> (key -> hyperparameter), the shape returned by the
/// Hyperparameter Extractor.
pub type CategorizedHParams = HashMap<HParamCategory, HashMap<String, HParam>>;

/// A decoded TensorBoard event record. Transient: produced by the Record
/// Parser, consumed by the Hyperparameter Extractor, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParsedEvent {
    pub wall_time: f64,
    pub step: i64,
    pub scalars: HashMap<String, f32>,
    pub texts: HashMap<String, String>,
    pub tags: Vec<String>,
}

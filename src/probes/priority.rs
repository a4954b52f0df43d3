//! Framework priority list (spec 4.G) used to pick a primary framework
//! when a single observation (or a single probe pass) turns up more than
//! one candidate, and to resolve wrapper/base relationships such as
//! primus wrapping megatron.

use crate::model::evidence::{FrameworkLayer, FrameworkLayerKind};

/// `primus > lightning > megatron > deepspeed > vllm > triton > tgi >
/// pytorch > others`, highest priority first.
pub const FRAMEWORK_PRIORITY: &[&str] = &[
    "primus",
    "lightning",
    "megatron",
    "deepspeed",
    "vllm",
    "triton",
    "tgi",
    "pytorch",
];

/// Lower rank = higher priority. Frameworks absent from the list rank
/// below all named ones, tied with each other.
pub fn priority_rank(framework: &str) -> usize {
    FRAMEWORK_PRIORITY
        .iter()
        .position(|f| *f == framework)
        .unwrap_or(FRAMEWORK_PRIORITY.len())
}

/// Given a set of frameworks detected together (e.g. in one process's
/// cmdline + env), pick the highest-priority one as primary. If a second
/// framework is also present and outranked by the primary, it becomes the
/// `base` of a wrapper/base [`FrameworkLayer`] (e.g. primus on megatron ->
/// framework=primus, wrapper=primus, base=megatron).
pub fn resolve_primary(frameworks: &[String]) -> (String, Option<FrameworkLayer>) {
    let mut distinct: Vec<String> = frameworks.to_vec();
    distinct.sort_by_key(|f| priority_rank(f));
    distinct.dedup();

    let primary = match distinct.first() {
        Some(f) => f.clone(),
        None => return (String::new(), None),
    };

    let base = distinct
        .iter()
        .skip(1)
        .find(|f| priority_rank(f) > priority_rank(&primary));

    match base {
        Some(base) => (
            primary.clone(),
            Some(FrameworkLayer {
                layer: FrameworkLayerKind::Wrapper,
                wrapper: primary,
                base: base.clone(),
            }),
        ),
        None => (primary, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primus_outranks_megatron_and_becomes_the_wrapper() {
        let (primary, layer) =
            resolve_primary(&["megatron".to_string(), "primus".to_string()]);
        assert_eq!(primary, "primus");
        let layer = layer.unwrap();
        assert_eq!(layer.wrapper, "primus");
        assert_eq!(layer.base, "megatron");
    }

    #[test]
    fn single_framework_has_no_layer() {
        let (primary, layer) = resolve_primary(&["pytorch".to_string()]);
        assert_eq!(primary, "pytorch");
        assert!(layer.is_none());
    }

    #[test]
    fn unranked_framework_does_not_crash_ranking() {
        let (primary, layer) = resolve_primary(&["some_custom_fw".to_string()]);
        assert_eq!(primary, "some_custom_fw");
        assert!(layer.is_none());
    }
}

//! Shared pattern-matcher registry (spec design notes: "pattern matcher
//! registry" is injected configuration, not module-level global state).
//!
//! Each matcher names the framework it identifies, the substring that
//! identifies it, and the confidence that substring carries on its own —
//! individual probes may override this with a flat per-probe confidence
//! (the process probe does; the log probe does not).

/// One substring -> framework mapping with an intrinsic confidence.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub framework: &'static str,
    pub needle: &'static str,
    pub base_confidence: f64,
}

/// Training-framework substrings looked for in a process cmdline or a log
/// line. Ordered roughly by specificity, not that order matters for
/// matching (all matchers are tried).
pub const CMDLINE_PATTERNS: &[Matcher] = &[
    Matcher { framework: "primus", needle: "primus", base_confidence: 0.90 },
    Matcher { framework: "megatron", needle: "megatron", base_confidence: 0.85 },
    Matcher { framework: "deepspeed", needle: "deepspeed", base_confidence: 0.80 },
    Matcher { framework: "lightning", needle: "pytorch_lightning", base_confidence: 0.80 },
    Matcher { framework: "vllm", needle: "vllm", base_confidence: 0.85 },
    Matcher { framework: "triton", needle: "tritonserver", base_confidence: 0.85 },
    Matcher { framework: "tgi", needle: "text-generation-inference", base_confidence: 0.80 },
    Matcher { framework: "pytorch", needle: "torch", base_confidence: 0.60 },
    Matcher { framework: "tensorflow", needle: "tensorflow", base_confidence: 0.60 },
];

/// Environment-variable substrings that identify a wrapper framework even
/// when its cmdline doesn't mention it (spec open question: env-only
/// signals like `PRIMUS_CONFIG` without a matching cmdline pattern).
pub const ENV_PATTERNS: &[Matcher] = &[
    Matcher { framework: "primus", needle: "PRIMUS_CONFIG", base_confidence: 0.80 },
    Matcher { framework: "deepspeed", needle: "DEEPSPEED_CONFIG", base_confidence: 0.75 },
    Matcher { framework: "megatron", needle: "MEGATRON_", base_confidence: 0.70 },
];

/// Image-reference substrings (spec 4.G: "vllm, triton, tgi, megatron, …").
pub const IMAGE_PATTERNS: &[Matcher] = &[
    Matcher { framework: "vllm", needle: "vllm", base_confidence: 0.60 },
    Matcher { framework: "triton", needle: "tritonserver", base_confidence: 0.60 },
    Matcher { framework: "tgi", needle: "text-generation-inference", base_confidence: 0.60 },
    Matcher { framework: "megatron", needle: "megatron", base_confidence: 0.60 },
    Matcher { framework: "deepspeed", needle: "deepspeed", base_confidence: 0.60 },
    Matcher { framework: "pytorch", needle: "pytorch", base_confidence: 0.60 },
];

/// All matchers in `registry` whose needle occurs in `haystack`
/// (case-insensitive substring match).
pub fn find_matches<'a>(haystack: &str, registry: &'a [Matcher]) -> Vec<&'a Matcher> {
    let lower = haystack.to_ascii_lowercase();
    registry
        .iter()
        .filter(|m| lower.contains(&m.needle.to_ascii_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        let hits = find_matches("python -m VLLM.entrypoints.api_server", IMAGE_PATTERNS);
        assert!(hits.iter().any(|m| m.framework == "vllm"));
    }

    #[test]
    fn no_match_returns_empty() {
        let hits = find_matches("some unrelated process", CMDLINE_PATTERNS);
        assert!(hits.is_empty());
    }

    #[test]
    fn env_only_signal_is_detectable_independent_of_cmdline() {
        let hits = find_matches("PRIMUS_CONFIG=/etc/primus.yaml", ENV_PATTERNS);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].framework, "primus");
    }
}

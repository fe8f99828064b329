//! C1: trust weighting, salience/confidence inference, token estimation, negation detection.

use std::collections::HashSet;

use crate::types::{MemoryType, TrustLevel};

const HIGH_IMPORTANCE_TOKENS: &[&str] = &[
    "must",
    "required",
    "deadline",
    "blocked",
    "constraint",
    "critical",
    "policy",
    "security",
    "cannot",
];

const LOW_CONFIDENCE_TOKENS: &[&str] = &["maybe", "might", "possibly", "unsure", "guess"];

const NEGATION_MARKERS: &[&str] = &["not", "no", "never", "cannot", "can't", "without"];

pub fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}

/// Tokenize on `\w+` (word characters), matching the Python `re.findall(r"\w+", text)` contract.
fn word_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() || ch == '_' {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            tokens.push(&text[s..idx]);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

/// Deterministic, monotonic-in-word-count token estimate. `max(1, round(word_count * 1.3))`.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = word_tokens(text).len();
    let estimate = (word_count as f64 * 1.3).round();
    estimate.max(1.0) as usize
}

/// Base salience per type, boosted 0.03 per high-importance token occurrence.
pub fn infer_salience(text: &str, memory_type: MemoryType, provided: Option<f64>) -> f64 {
    if let Some(value) = provided {
        return clamp(value, 0.0, 1.0);
    }

    let base = match memory_type {
        MemoryType::Event => 0.45,
        MemoryType::Fact => 0.70,
        MemoryType::Episode => 0.60,
        MemoryType::Policy => 0.90,
    };
    let lowered = text.to_lowercase();
    let boost = HIGH_IMPORTANCE_TOKENS
        .iter()
        .filter(|token| lowered.contains(*token))
        .count() as f64
        * 0.03;
    clamp(base + boost, 0.05, 0.99)
}

/// Base confidence per trust level, penalized 0.05 per uncertainty token occurrence.
pub fn infer_confidence(text: &str, trust_level: TrustLevel, provided: Option<f64>) -> f64 {
    if let Some(value) = provided {
        return clamp(value, 0.0, 1.0);
    }

    let base = match trust_level {
        TrustLevel::TrustedTool => 0.82,
        TrustLevel::UserClaim => 0.66,
        TrustLevel::UntrustedWeb => 0.38,
    };
    let lowered = text.to_lowercase();
    let penalty = LOW_CONFIDENCE_TOKENS
        .iter()
        .filter(|token| lowered.contains(*token))
        .count() as f64
        * 0.05;
    clamp(base - penalty, 0.05, 0.98)
}

pub fn trust_score(trust_level: TrustLevel) -> f64 {
    trust_level.trust_score()
}

/// True iff one of the negation markers appears as a standalone, space-surrounded word
/// after lowercasing (`" not | no | never | cannot | can't | without "`).
pub fn has_negation(text: &str) -> bool {
    let padded = format!(" {} ", text.to_lowercase());
    NEGATION_MARKERS
        .iter()
        .any(|marker| padded.contains(&format!(" {marker} ")))
}

/// Lowercased `\w+` token set, used for lexical overlap and conflict detection.
pub fn token_set(text: &str) -> HashSet<String> {
    word_tokens(&text.to_lowercase())
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Jaccard overlap between two token sets.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_matches_contract() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("one two three four"), 5);
    }

    #[test]
    fn salience_boosts_on_high_importance_tokens() {
        let base = infer_salience("a quiet note", MemoryType::Event, None);
        let boosted = infer_salience("this is a required deadline constraint", MemoryType::Event, None);
        assert!(boosted > base);
    }

    #[test]
    fn confidence_penalizes_uncertainty() {
        let base = infer_confidence("the server is up", TrustLevel::UserClaim, None);
        let penalized = infer_confidence("maybe the server is up", TrustLevel::UserClaim, None);
        assert!(penalized < base);
    }

    #[test]
    fn negation_requires_word_boundary() {
        assert!(has_negation("it cannot proceed"));
        assert!(!has_negation("cannotproceed without spaces"));
        assert!(has_negation("do this without delay"));
    }

    #[test]
    fn provided_scores_bypass_inference() {
        assert_eq!(infer_salience("anything", MemoryType::Event, Some(0.5)), 0.5);
        assert_eq!(
            infer_confidence("anything", TrustLevel::UserClaim, Some(0.9)),
            0.9
        );
    }
}

//! Feature extraction: lowercase, tokenize `[A-Za-z0-9#_-]+`, derive four
//! relation-typed feature sets.

use std::collections::HashSet;

use crate::types::Relation;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "to", "was", "with",
];

const TEMPORAL_VOCAB: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "daily",
    "weekly",
    "monthly",
    "hourly",
    "minute",
    "minutes",
    "hour",
    "hours",
    "day",
    "days",
];

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut start = None;
    let is_token_char = |c: char| c.is_ascii_alphanumeric() || c == '#' || c == '_' || c == '-';

    for (idx, ch) in lowered.char_indices() {
        if is_token_char(ch) {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            tokens.push(lowered[s..idx].to_owned());
        }
    }
    if let Some(s) = start {
        tokens.push(lowered[s..].to_owned());
    }
    tokens
}

fn is_keyword(token: &str) -> bool {
    token.len() >= 3 && !token.chars().all(|c| c.is_ascii_digit()) && !STOPWORDS.contains(&token)
}

fn is_reference(token: &str) -> bool {
    token.len() >= 3
        && token.chars().any(|c| c.is_ascii_alphabetic())
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Returns the `(relation, term)` feature pairs present in `text`.
pub fn extract_features(text: &str) -> HashSet<(Relation, String)> {
    let tokens = tokenize(text);
    let mut features = HashSet::new();

    for token in tokens.iter().filter(|t| is_keyword(t)) {
        features.insert((Relation::Keyword, token.clone()));
    }

    for window in tokens.windows(2) {
        let (a, b) = (window[0].as_str(), window[1].as_str());
        if is_keyword(a) && is_keyword(b) && a != b {
            features.insert((Relation::Phrase, format!("{a}_{b}")));
        }
    }

    for window in tokens.windows(2) {
        let (num, unit) = (window[0].as_str(), window[1].as_str());
        if num.chars().all(|c| c.is_ascii_digit())
            && !num.is_empty()
            && TEMPORAL_VOCAB.contains(&unit)
        {
            features.insert((Relation::Temporal, format!("{num}_{unit}")));
        }
    }
    for token in &tokens {
        if TEMPORAL_VOCAB.contains(&token.as_str()) {
            features.insert((Relation::Temporal, token.clone()));
        }
    }

    for token in &tokens {
        if is_reference(token) {
            features.insert((Relation::Reference, token.clone()));
        }
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_excludes_stopwords_and_short_tokens() {
        let features = extract_features("the cat is on a mat");
        assert!(!features.contains(&(Relation::Keyword, "the".to_owned())));
        assert!(features.contains(&(Relation::Keyword, "cat".to_owned())));
        assert!(features.contains(&(Relation::Keyword, "mat".to_owned())));
    }

    #[test]
    fn phrase_joins_adjacent_keyword_bigrams() {
        let features = extract_features("regulation pack RC-22");
        assert!(features.contains(&(Relation::Phrase, "regulation_pack".to_owned())));
    }

    #[test]
    fn temporal_matches_vocab_and_digit_unit_pairs() {
        let features = extract_features("runs every 400 days on monday");
        assert!(features.contains(&(Relation::Temporal, "monday".to_owned())));
        assert!(features.contains(&(Relation::Temporal, "400_days".to_owned())));
    }

    #[test]
    fn reference_requires_letters_and_digits() {
        let features = extract_features("regulation pack RC-22 maps to RD-91");
        assert!(features.contains(&(Relation::Reference, "rc-22".to_owned())));
        assert!(features.contains(&(Relation::Reference, "rd-91".to_owned())));
    }
}

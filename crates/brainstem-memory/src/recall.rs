//! Shared recall scoring, packing, and conflict detection, usable by any
//! backend once it has produced a tenant-scoped candidate set.

use brainstem_core::scoring::{estimate_tokens, has_negation, jaccard, token_set};
use brainstem_core::{Scope, TrustLevel};

use crate::types::{MemoryRecord, MemorySnippet, RecallFilters};

/// Visibility rule, used by recall and inspect.
pub fn is_visible(record: &MemoryRecord, requested_scope: Scope, reader_agent_id: &str) -> bool {
    if record.tombstoned {
        return false;
    }
    match record.scope {
        Scope::Global => true,
        Scope::Team => matches!(requested_scope, Scope::Team | Scope::Global),
        Scope::Private => record.agent_id == reader_agent_id,
    }
}

/// Private records are only deletable by their author; already-tombstoned
/// records cannot be deleted again (forget is idempotent by returning
/// `deleted=false` on a repeat call, matching the original's `_can_delete`).
pub fn can_delete(agent_id: &str, record: &MemoryRecord) -> bool {
    if record.tombstoned {
        return false;
    }
    if matches!(record.scope, Scope::Private) && record.agent_id != agent_id {
        return false;
    }
    true
}

pub fn is_expired(record: &MemoryRecord, now: chrono::DateTime<chrono::Utc>) -> bool {
    record.expires_at.is_some_and(|expires_at| expires_at <= now)
}

pub fn passes_filters(record: &MemoryRecord, filters: &RecallFilters) -> bool {
    if record.trust_level.trust_score() < filters.trust_min {
        return false;
    }
    if let Some(types) = &filters.types
        && !types.contains(&record.memory_type)
    {
        return false;
    }
    true
}

/// The full tenant-scoped, visible, filtered candidate selection.
pub fn select_candidates<'a>(
    records: &'a [MemoryRecord],
    tenant_id: &str,
    agent_id: &str,
    scope: Scope,
    filters: &RecallFilters,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<&'a MemoryRecord> {
    records
        .iter()
        .filter(|record| record.tenant_id == tenant_id)
        .filter(|record| !record.tombstoned)
        .filter(|record| !is_expired(record, now))
        .filter(|record| passes_filters(record, filters))
        .filter(|record| is_visible(record, scope, agent_id))
        .collect()
}

/// Recall scoring formula.
pub fn score_record(
    record: &MemoryRecord,
    query_tokens: &std::collections::HashSet<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> f64 {
    let lexical_overlap = if query_tokens.is_empty() {
        0.0
    } else {
        let text_tokens = token_set(&record.text);
        let overlap = query_tokens.intersection(&text_tokens).count() as f64;
        overlap / query_tokens.len() as f64
    };
    let age_seconds = (now - record.created_at).num_seconds().max(0) as f64;
    let recency_bonus = 1.0 / (1.0 + age_seconds / 3600.0);

    0.45 * lexical_overlap
        + 0.25 * record.salience
        + 0.20 * record.confidence
        + 0.07 * record.trust_level.trust_score()
        + 0.03 * recency_bonus
}

/// Sorts descending by score, packs greedily within the token and item
/// budget. Returns scored snippets in packed order.
pub fn rank_and_pack(
    mut candidates: Vec<&MemoryRecord>,
    query: &str,
    max_items: usize,
    max_tokens: usize,
    now: chrono::DateTime<chrono::Utc>,
) -> (Vec<MemorySnippet>, usize) {
    let query_tokens = token_set(query);
    candidates.sort_by(|a, b| {
        score_record(b, &query_tokens, now)
            .partial_cmp(&score_record(a, &query_tokens, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut items = Vec::new();
    let mut composed_tokens = 0usize;
    for record in candidates {
        if items.len() >= max_items {
            break;
        }
        let token_estimate = estimate_tokens(&record.text);
        if composed_tokens + token_estimate > max_tokens {
            continue;
        }
        let score = score_record(record, &query_tokens, now);
        composed_tokens += token_estimate;
        items.push(MemorySnippet {
            memory_id: record.memory_id.clone(),
            text: record.text.clone(),
            memory_type: record.memory_type,
            scope: record.scope,
            trust_level: record.trust_level,
            confidence: record.confidence,
            salience: record.salience,
            score,
            token_estimate,
            created_at: record.created_at,
        });
    }
    (items, composed_tokens)
}

/// Conflict detection among selected `fact` records.
pub fn detect_conflicts(items: &[MemorySnippet]) -> Vec<String> {
    let facts: Vec<&MemorySnippet> = items
        .iter()
        .filter(|item| item.memory_type == brainstem_core::MemoryType::Fact)
        .collect();

    let mut conflicts = Vec::new();
    for i in 0..facts.len() {
        for j in (i + 1)..facts.len() {
            let a = facts[i];
            let b = facts[j];
            let overlap = jaccard(&token_set(&a.text), &token_set(&b.text));
            if overlap >= 0.5 && has_negation(&a.text) != has_negation(&b.text) {
                conflicts.push(format!(
                    "possible_conflict:{}:{}",
                    a.memory_id, b.memory_id
                ));
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_core::{MemoryType, TrustLevel};
    use chrono::Utc;

    fn record(scope: Scope, agent_id: &str, memory_type: MemoryType, text: &str) -> MemoryRecord {
        MemoryRecord {
            memory_id: "m1".to_owned(),
            tenant_id: "t1".to_owned(),
            agent_id: agent_id.to_owned(),
            memory_type,
            scope,
            trust_level: TrustLevel::TrustedTool,
            text: text.to_owned(),
            source_ref: None,
            confidence: 0.8,
            salience: 0.8,
            created_at: Utc::now(),
            expires_at: None,
            tombstoned: false,
        }
    }

    #[test]
    fn private_only_visible_to_author() {
        let r = record(Scope::Private, "A", MemoryType::Fact, "x");
        assert!(is_visible(&r, Scope::Global, "A"));
        assert!(!is_visible(&r, Scope::Global, "B"));
    }

    #[test]
    fn team_requires_team_or_global_request() {
        let r = record(Scope::Team, "A", MemoryType::Fact, "x");
        assert!(is_visible(&r, Scope::Team, "B"));
        assert!(is_visible(&r, Scope::Global, "B"));
        assert!(!is_visible(&r, Scope::Private, "B"));
    }

    #[test]
    fn conflict_requires_overlap_and_negation_mismatch() {
        let a = MemorySnippet {
            memory_id: "a".into(),
            text: "The release cannot proceed without passing integration tests.".into(),
            memory_type: MemoryType::Fact,
            scope: Scope::Team,
            trust_level: TrustLevel::TrustedTool,
            confidence: 0.8,
            salience: 0.8,
            score: 1.0,
            token_estimate: 5,
            created_at: Utc::now(),
        };
        let mut b = a.clone();
        b.memory_id = "b".into();
        b.text = "The release can proceed without passing integration tests.".into();
        let conflicts = detect_conflicts(&[a, b]);
        assert_eq!(conflicts, vec!["possible_conflict:a:b".to_owned()]);
    }
}

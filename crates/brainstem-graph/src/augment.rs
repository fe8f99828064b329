//! Augmented recall: expand a base recall response using query-seeded
//! and edge-seeded graph candidates within the remaining token/item budget.

use std::collections::HashSet;

use brainstem_core::scoring::estimate_tokens;
use brainstem_core::CoreResult;
use brainstem_memory::{MemoryRepository, MemorySnippet, RecallRequest, RecallResponse};

use crate::traits::GraphStore;

pub fn augmented_recall(
    repo: &dyn MemoryRepository,
    graph: &dyn GraphStore,
    request: RecallRequest,
    max_expansion: usize,
) -> CoreResult<RecallResponse> {
    let max_items = request.budget.max_items;
    let max_tokens = request.budget.max_tokens;

    let expansion_budget = max_expansion.min(max_items / 2);

    let mut base_request = request.clone();
    if expansion_budget > 0 && max_items > 1 {
        base_request.budget.max_items = max_items - expansion_budget;
    }

    let base = repo.recall(base_request)?;
    if expansion_budget == 0 {
        return Ok(base);
    }

    let base_ids: HashSet<String> = base.items.iter().map(|item| item.memory_id.clone()).collect();
    let cap = expansion_budget
        .saturating_mul(2)
        .max(max_expansion.saturating_mul(2))
        .max(4);

    let query_seed_candidates = graph
        .query_candidates(&request.tenant_id, &request.query, &base_ids, cap)
        .unwrap_or_default();

    let edge_related = graph
        .related(&request.tenant_id, &base_ids.iter().cloned().collect::<Vec<_>>(), &base_ids, cap)
        .unwrap_or_default();

    let query_seed_set: HashSet<&String> = query_seed_candidates.iter().collect();
    let edge_related_set: HashSet<&String> = edge_related.iter().collect();

    let mut merged: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for id in &edge_related {
        if query_seed_set.contains(id) && seen.insert(id.clone()) {
            merged.push(id.clone());
        }
    }
    for id in &edge_related {
        if !query_seed_set.contains(id) && seen.insert(id.clone()) {
            merged.push(id.clone());
        }
    }
    for id in &query_seed_candidates {
        if !edge_related_set.contains(id) && seen.insert(id.clone()) {
            merged.push(id.clone());
        }
    }

    let mut items = base.items;
    let mut composed_tokens_estimate = base.composed_tokens_estimate;

    for memory_id in merged {
        if items.len() >= max_items {
            break;
        }
        let Ok(details) = repo.inspect(&request.tenant_id, &request.agent_id, request.scope, &memory_id)
        else {
            continue;
        };
        let token_estimate = estimate_tokens(&details.text);
        if composed_tokens_estimate + token_estimate > max_tokens {
            continue;
        }
        composed_tokens_estimate += token_estimate;
        items.push(MemorySnippet {
            memory_id: details.memory_id,
            text: details.text,
            memory_type: details.memory_type,
            scope: details.scope,
            trust_level: details.trust_level,
            confidence: details.confidence,
            salience: details.salience,
            score: 0.0,
            token_estimate,
            created_at: details.created_at,
        });
    }

    Ok(RecallResponse {
        items,
        composed_tokens_estimate,
        conflicts: base.conflicts,
        trace_id: base.trace_id,
        model_version: base.model_version,
        model_route: base.model_route,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use brainstem_core::{MemoryType, Scope, TrustLevel};
    use brainstem_memory::{InMemoryRepository, NewMemoryItem, RecallBudget, RecallFilters, RememberRequest};

    use super::*;
    use crate::inmemory::InMemoryGraphStore;

    fn remember(repo: &InMemoryRepository, agent_id: &str, scope: Scope, text: &str) -> String {
        let response = repo
            .remember(RememberRequest {
                tenant_id: "t".to_owned(),
                agent_id: agent_id.to_owned(),
                scope,
                items: vec![NewMemoryItem {
                    memory_type: MemoryType::Fact,
                    trust_level: TrustLevel::TrustedTool,
                    text: text.to_owned(),
                    source_ref: None,
                    confidence: None,
                    salience: None,
                    expires_at: None,
                }],
                idempotency_key: None,
            })
            .expect("remember");
        response.memory_ids[0].clone()
    }

    #[test]
    fn expansion_budget_reserves_half_of_max_items() {
        let repo = InMemoryRepository::new();
        let graph = InMemoryGraphStore::new(HashMap::new(), 168.0);

        let lexical_id = remember(&repo, "a", Scope::Team, "Project Orion quarterly budget review.");
        graph.project_memory("t", &lexical_id, "Project Orion quarterly budget review.").expect("project");
        let related_id = remember(&repo, "a", Scope::Team, "Project Orion owns the north datacenter lease.");
        graph.project_memory("t", &related_id, "Project Orion owns the north datacenter lease.").expect("project");

        let response = augmented_recall(
            &repo,
            &graph,
            RecallRequest {
                tenant_id: "t".to_owned(),
                agent_id: "a".to_owned(),
                query: "Project Orion quarterly budget review".to_owned(),
                scope: Scope::Team,
                budget: RecallBudget { max_items: 2, max_tokens: 2000 },
                filters: RecallFilters::default(),
            },
            2,
        )
        .expect("augmented recall");

        assert!(response.items.len() <= 2);
        assert!(response.items.iter().any(|item| item.memory_id == lexical_id));
    }

    #[test]
    fn expansion_never_surfaces_a_memory_invisible_to_the_requester() {
        let repo = InMemoryRepository::new();
        let graph = InMemoryGraphStore::new(HashMap::new(), 168.0);

        let public_id = remember(&repo, "a", Scope::Team, "Project Orion status update for the team.");
        graph.project_memory("t", &public_id, "Project Orion status update for the team.").expect("project");
        let private_id = remember(&repo, "b", Scope::Private, "Project Orion personal notes for agent b.");
        graph.project_memory("t", &private_id, "Project Orion personal notes for agent b.").expect("project");

        let response = augmented_recall(
            &repo,
            &graph,
            RecallRequest {
                tenant_id: "t".to_owned(),
                agent_id: "a".to_owned(),
                query: "Project Orion".to_owned(),
                scope: Scope::Team,
                budget: RecallBudget { max_items: 10, max_tokens: 2000 },
                filters: RecallFilters::default(),
            },
            4,
        )
        .expect("augmented recall");

        assert!(response.items.iter().all(|item| item.memory_id != private_id));
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use brainstem_core::ids::{new_memory_id, new_trace_id};
use brainstem_core::scoring::{infer_confidence, infer_salience};
use brainstem_core::{CoreError, CoreResult};
use chrono::Utc;
use tracing::debug;

use crate::recall::{can_delete, detect_conflicts, is_visible, rank_and_pack, select_candidates};
use crate::traits::MemoryRepository;
use crate::types::{
    ForgetResponse, MemoryDetails, MemoryRecord, RecallRequest, RecallResponse, RememberRequest,
    RememberResponse,
};

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, MemoryRecord>,
    idempotency: HashMap<(String, String), RememberResponse>,
}

/// In-memory map + RW-lock backend.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryRepository for InMemoryRepository {
    fn remember(&self, request: RememberRequest) -> CoreResult<RememberResponse> {
        if request.items.is_empty() || request.items.len() > 100 {
            return Err(CoreError::Validation(
                "items must contain between 1 and 100 entries".to_owned(),
            ));
        }
        if let Some(key) = &request.idempotency_key
            && key.len() > 128
        {
            return Err(CoreError::Validation(
                "idempotency_key must be at most 128 characters".to_owned(),
            ));
        }
        for item in &request.items {
            let trimmed = item.text.trim();
            if trimmed.is_empty() || trimmed.chars().count() > 4000 {
                return Err(CoreError::Validation(
                    "text must be 1..4000 chars after trim".to_owned(),
                ));
            }
            if let Some(source_ref) = &item.source_ref
                && source_ref.chars().count() > 512
            {
                return Err(CoreError::Validation(
                    "source_ref must be at most 512 chars".to_owned(),
                ));
            }
        }

        let mut state = self.state.write().expect("memory state lock poisoned");

        if let Some(key) = &request.idempotency_key {
            let idem_key = (request.tenant_id.clone(), key.clone());
            if let Some(stored) = state.idempotency.get(&idem_key) {
                let mut response = stored.clone();
                response.warnings.push("idempotency_replay".to_owned());
                return Ok(response);
            }
        }

        let now = Utc::now();
        let mut memory_ids = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let text = item.text.trim().to_owned();
            let confidence = infer_confidence(&text, item.trust_level, item.confidence);
            let salience = infer_salience(&text, item.memory_type, item.salience);
            let memory_id = new_memory_id();
            let record = MemoryRecord {
                memory_id: memory_id.clone(),
                tenant_id: request.tenant_id.clone(),
                agent_id: request.agent_id.clone(),
                memory_type: item.memory_type,
                scope: request.scope,
                trust_level: item.trust_level,
                text,
                source_ref: item.source_ref.clone(),
                confidence,
                salience,
                created_at: now,
                expires_at: item.expires_at,
                tombstoned: false,
            };
            state.records.insert(memory_id.clone(), record);
            memory_ids.push(memory_id);
        }

        let response = RememberResponse {
            accepted: memory_ids.len(),
            rejected: 0,
            memory_ids,
            warnings: Vec::new(),
        };

        if let Some(key) = request.idempotency_key {
            state
                .idempotency
                .insert((request.tenant_id, key), response.clone());
        }

        debug!(accepted = response.accepted, "remember complete");
        Ok(response)
    }

    fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse> {
        if !(1..=100).contains(&request.budget.max_items) {
            return Err(CoreError::Validation("max_items must be 1..100".to_owned()));
        }
        if !(64..=32000).contains(&request.budget.max_tokens) {
            return Err(CoreError::Validation(
                "max_tokens must be 64..32000".to_owned(),
            ));
        }

        let state = self.state.read().expect("memory state lock poisoned");
        let now = Utc::now();
        let records: Vec<MemoryRecord> = state.records.values().cloned().collect();
        drop(state);

        let candidates = select_candidates(
            &records,
            &request.tenant_id,
            &request.agent_id,
            request.scope,
            &request.filters,
            now,
        );
        let (items, composed_tokens_estimate) = rank_and_pack(
            candidates,
            &request.query,
            request.budget.max_items,
            request.budget.max_tokens,
            now,
        );
        let conflicts = detect_conflicts(&items);

        Ok(RecallResponse {
            items,
            composed_tokens_estimate,
            conflicts,
            trace_id: new_trace_id(),
            model_version: None,
            model_route: None,
        })
    }

    fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: brainstem_core::Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails> {
        let state = self.state.read().expect("memory state lock poisoned");
        let record = state
            .records
            .get(memory_id)
            .filter(|record| record.tenant_id == tenant_id)
            .filter(|record| is_visible(record, scope, agent_id))
            .ok_or(CoreError::NotFound)?;
        Ok(MemoryDetails::from(record))
    }

    fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
        let mut state = self.state.write().expect("memory state lock poisoned");
        let Some(record) = state
            .records
            .get(memory_id)
            .filter(|record| record.tenant_id == tenant_id)
        else {
            return Ok(ForgetResponse { deleted: false });
        };
        if !can_delete(agent_id, record) {
            return Ok(ForgetResponse { deleted: false });
        }

        let record = state.records.get_mut(memory_id).expect("checked above");
        record.tombstoned = true;
        Ok(ForgetResponse { deleted: true })
    }

    fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize> {
        let mut state = self.state.write().expect("memory state lock poisoned");
        let cutoff = Utc::now() - chrono::Duration::seconds((grace_hours * 3600.0) as i64);
        let mut purged = 0usize;
        for record in state.records.values_mut() {
            if record.tenant_id != tenant_id || record.tombstoned {
                continue;
            }
            if record.expires_at.is_some_and(|expires_at| expires_at <= cutoff) {
                record.tombstoned = true;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_core::{MemoryType, Scope, TrustLevel};
    use crate::types::{NewMemoryItem, RecallBudget, RecallFilters};

    fn item(text: &str) -> NewMemoryItem {
        NewMemoryItem {
            memory_type: MemoryType::Fact,
            trust_level: TrustLevel::TrustedTool,
            text: text.to_owned(),
            source_ref: None,
            confidence: None,
            salience: None,
            expires_at: None,
        }
    }

    #[test]
    fn idempotent_remember_replays_without_new_writes() {
        let repo = InMemoryRepository::new();
        let request = RememberRequest {
            tenant_id: "t".into(),
            agent_id: "a".into(),
            scope: Scope::Team,
            items: vec![item("Deployment migration must finish before April.")],
            idempotency_key: Some("idem-1".into()),
        };
        let first = repo.remember(request.clone()).expect("first write");
        assert_eq!(first.accepted, 1);
        let second = repo.remember(request).expect("replay");
        assert_eq!(second.memory_ids, first.memory_ids);
        assert!(second.warnings.contains(&"idempotency_replay".to_owned()));

        let state = repo.state.read().expect("lock");
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn private_memory_invisible_to_other_agent() {
        let repo = InMemoryRepository::new();
        let response = repo
            .remember(RememberRequest {
                tenant_id: "t".into(),
                agent_id: "A".into(),
                scope: Scope::Private,
                items: vec![item("secret plan")],
                idempotency_key: None,
            })
            .expect("write");
        let memory_id = &response.memory_ids[0];

        let result = repo.inspect(
            "t",
            "B",
            Scope::Global,
            memory_id,
        );
        assert!(matches!(result, Err(CoreError::NotFound)));

        let recall = repo
            .recall(RecallRequest {
                tenant_id: "t".into(),
                agent_id: "B".into(),
                query: String::new(),
                scope: Scope::Global,
                budget: RecallBudget { max_items: 10, max_tokens: 1000 },
                filters: RecallFilters::default(),
            })
            .expect("recall");
        assert!(recall.items.is_empty());
    }

    #[test]
    fn forget_is_terminal() {
        let repo = InMemoryRepository::new();
        let response = repo
            .remember(RememberRequest {
                tenant_id: "t".into(),
                agent_id: "A".into(),
                scope: Scope::Team,
                items: vec![item("a fact")],
                idempotency_key: None,
            })
            .expect("write");
        let memory_id = response.memory_ids[0].clone();

        let forgotten = repo.forget("t", "A", &memory_id).expect("forget");
        assert!(forgotten.deleted);

        let result = repo.inspect("t", "A", Scope::Private, &memory_id);
        assert!(matches!(result, Err(CoreError::NotFound)));
    }
}

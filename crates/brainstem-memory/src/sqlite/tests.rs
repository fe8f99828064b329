use brainstem_core::{MemoryType, Scope, TrustLevel};

use crate::traits::MemoryRepository;
use crate::types::{NewMemoryItem, RecallBudget, RecallFilters, RecallRequest, RememberRequest};

use super::SqliteRepository;

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
    let repo = SqliteRepository::open_in_memory().expect("open");
    let request = RememberRequest {
        tenant_id: "t".into(),
        agent_id: "a".into(),
        scope: Scope::Team,
        items: vec![item("Deployment migration must finish before April.")],
        idempotency_key: Some("idem-1".into()),
    };
    let first = repo.remember(request.clone()).expect("first write");
    let second = repo.remember(request).expect("replay");
    assert_eq!(first.memory_ids, second.memory_ids);
    assert!(second.warnings.contains(&"idempotency_replay".to_owned()));
}

#[test]
fn recall_respects_token_and_item_budget() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    repo.remember(RememberRequest {
        tenant_id: "t".into(),
        agent_id: "a".into(),
        scope: Scope::Global,
        items: vec![
            item("alpha fact about migration"),
            item("beta fact about migration"),
            item("gamma fact about migration"),
        ],
        idempotency_key: None,
    })
    .expect("write");

    let recall = repo
        .recall(RecallRequest {
            tenant_id: "t".into(),
            agent_id: "a".into(),
            query: "migration".into(),
            scope: Scope::Global,
            budget: RecallBudget {
                max_items: 2,
                max_tokens: 1000,
            },
            filters: RecallFilters::default(),
        })
        .expect("recall");

    assert!(recall.items.len() <= 2);
    assert!(recall.composed_tokens_estimate <= 1000);
}

#[test]
fn purge_expired_is_idempotent() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let response = repo
        .remember(RememberRequest {
            tenant_id: "t".into(),
            agent_id: "a".into(),
            scope: Scope::Global,
            items: vec![NewMemoryItem {
                expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(48)),
                ..item("stale fact")
            }],
            idempotency_key: None,
        })
        .expect("write");
    assert_eq!(response.accepted, 1);

    let purged_first = repo.purge_expired("t", 24.0).expect("purge");
    assert_eq!(purged_first, 1);
    let purged_second = repo.purge_expired("t", 24.0).expect("purge again");
    assert_eq!(purged_second, 0);
}

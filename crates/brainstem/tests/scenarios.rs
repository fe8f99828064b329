use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use brainstem::Brainstem;
use brainstem_core::{Config, CoreResult, JobBackend, MemoryType, Scope, StoreBackend, TrustLevel};
use brainstem_jobs::{InProcessJobQueue, JobManager};
use brainstem_memory::{
    ForgetResponse, InMemoryRepository, MemoryDetails, MemoryRepository, NewMemoryItem,
    RecallBudget, RecallFilters, RecallRequest, RememberRequest, RememberResponse,
};

fn remember_one(
    brainstem: &Brainstem,
    tenant_id: &str,
    agent_id: &str,
    scope: Scope,
    text: &str,
    memory_type: MemoryType,
    idempotency_key: Option<&str>,
) -> RememberResponse {
    brainstem
        .remember(RememberRequest {
            tenant_id: tenant_id.to_owned(),
            agent_id: agent_id.to_owned(),
            scope,
            items: vec![NewMemoryItem {
                memory_type,
                trust_level: TrustLevel::TrustedTool,
                text: text.to_owned(),
                source_ref: None,
                confidence: None,
                salience: None,
                expires_at: None,
            }],
            idempotency_key: idempotency_key.map(str::to_owned),
        })
        .expect("remember should succeed")
}

#[test]
fn s1_lifecycle() {
    let config = Config::default();
    let brainstem = Brainstem::new(&config).expect("construct brainstem");

    let first = remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "Deployment migration must finish before April planning cycle.",
        MemoryType::Fact,
        Some("idem-1"),
    );
    assert_eq!(first.accepted, 1);
    assert_eq!(first.memory_ids.len(), 1);
    let memory_id = first.memory_ids[0].clone();

    let replay = remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "Deployment migration must finish before April planning cycle.",
        MemoryType::Fact,
        Some("idem-1"),
    );
    assert_eq!(replay.memory_ids, vec![memory_id.clone()]);
    assert!(replay.warnings.iter().any(|w| w == "idempotency_replay"));

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "A".to_owned(),
            query: "What migration constraints exist?".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 10, max_tokens: 1200 },
            filters: RecallFilters { trust_min: 0.0, types: Some(vec![MemoryType::Fact]) },
        })
        .expect("recall should succeed");
    assert_eq!(recall.items.first().map(|item| &item.memory_id), Some(&memory_id));

    let details = brainstem.inspect("T", "A", Scope::Team, &memory_id).expect("inspect should find it");
    assert_eq!(details.memory_id, memory_id);

    let forget = brainstem.forget("T", "A", &memory_id).expect("forget should succeed");
    assert!(forget.deleted);

    let result: CoreResult<MemoryDetails> = brainstem.inspect("T", "A", Scope::Team, &memory_id);
    assert!(result.is_err());
}

#[test]
fn s2_scope_isolation() {
    let config = Config::default();
    let brainstem = Brainstem::new(&config).expect("construct brainstem");

    let response = remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Private,
        "Agent A keeps a private note about the migration window.",
        MemoryType::Fact,
        None,
    );
    let memory_id = response.memory_ids[0].clone();

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "B".to_owned(),
            query: "migration window".to_owned(),
            scope: Scope::Global,
            budget: RecallBudget { max_items: 10, max_tokens: 1200 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");
    assert!(recall.items.is_empty());

    let result = brainstem.inspect("T", "B", Scope::Global, &memory_id);
    assert!(result.is_err());
}

#[test]
fn s3_conflict_detection() {
    let config = Config::default();
    let brainstem = Brainstem::new(&config).expect("construct brainstem");

    remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "The release cannot proceed without passing integration tests.",
        MemoryType::Fact,
        None,
    );
    remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "The release can proceed without passing integration tests.",
        MemoryType::Fact,
        None,
    );

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "A".to_owned(),
            query: "release integration tests".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 10, max_tokens: 2000 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");

    assert!(recall.conflicts.iter().any(|c| c.starts_with("possible_conflict:")));
}

#[test]
fn s4_graph_expansion() {
    let mut config = Config::default();
    config.graph.max_expansion = 2;
    let brainstem = Brainstem::new(&config).expect("construct brainstem");

    remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "Regulation pack RC-22 maps to retention profile RD-91.",
        MemoryType::Fact,
        None,
    );
    remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "RD-91 enforces 400-day retention and legal hold exports.",
        MemoryType::Fact,
        None,
    );
    remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "Regulation pack RC-22 summary stays in legal review queue.",
        MemoryType::Fact,
        None,
    );

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "A".to_owned(),
            query: "What does regulation pack RC-22 require?".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 2, max_tokens: 2000 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");

    assert!(recall.items.iter().any(|item| item.text.contains("400-day retention")));
}

/// Wraps an in-memory repository whose `purge_expired` fails a fixed number
/// of times before delegating, used to exercise the retry-then-dead-letter
/// path without a real transient-failure source.
struct FlakyPurgeRepository {
    inner: InMemoryRepository,
    remaining_failures: AtomicUsize,
}

impl FlakyPurgeRepository {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

impl MemoryRepository for FlakyPurgeRepository {
    fn remember(
        &self,
        request: RememberRequest,
    ) -> CoreResult<RememberResponse> {
        self.inner.remember(request)
    }

    fn recall(
        &self,
        request: RecallRequest,
    ) -> CoreResult<brainstem_memory::RecallResponse> {
        self.inner.recall(request)
    }

    fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails> {
        self.inner.inspect(tenant_id, agent_id, scope, memory_id)
    }

    fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
        self.inner.forget(tenant_id, agent_id, memory_id)
    }

    fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize> {
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n > 0).then_some(n - 1)
        }).is_ok() {
            return Err(brainstem_core::CoreError::Internal(anyhow::anyhow!("injected purge failure")));
        }
        self.inner.purge_expired(tenant_id, grace_hours)
    }
}

#[test]
fn s5_job_retry_then_dead_letter() {
    let repository: Arc<dyn MemoryRepository> = Arc::new(FlakyPurgeRepository::new(5));
    let queue = Arc::new(InProcessJobQueue::new());
    let manager = JobManager::new(queue, repository, None, 2, 0.01);

    let job = manager.submit_cleanup("T", "A", 24.0).expect("submit cleanup");

    assert!(manager.process_next().expect("first attempt"));
    let after_first = manager.get(&job.job_id).expect("get job").expect("job exists");
    assert_eq!(after_first.attempts, 1);
    assert_eq!(after_first.status, brainstem_jobs::JobStatus::Queued);

    assert!(manager.process_next().expect("second attempt"));
    let after_second = manager.get(&job.job_id).expect("get job").expect("job exists");
    assert_eq!(after_second.attempts, 2);
    assert_eq!(after_second.status, brainstem_jobs::JobStatus::Failed);

    let dead_letters = manager.list_dead_letters("T", 10).expect("list dead letters");
    assert!(dead_letters.iter().any(|record| record.job_id == job.job_id));
}

#[test]
fn s6_canary_routing() {
    let config = Config::default();
    let brainstem = Brainstem::new(&config).expect("construct brainstem");

    brainstem
        .register_canary("reranker", "reranker-canary-v2", 0, Some(vec!["T".to_owned()]), None, None)
        .expect("register canary");

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "A".to_owned(),
            query: "anything".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 10, max_tokens: 1200 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");
    assert_eq!(recall.model_version.as_deref(), Some("reranker-canary-v2"));
    assert_eq!(recall.model_route.as_deref(), Some("canary_allowlist"));

    brainstem.promote_canary("reranker", None).expect("promote canary");

    let recall_other_tenant = brainstem
        .recall(RecallRequest {
            tenant_id: "other-tenant".to_owned(),
            agent_id: "A".to_owned(),
            query: "anything".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 10, max_tokens: 1200 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");
    assert_eq!(recall_other_tenant.model_version.as_deref(), Some("reranker-canary-v2"));
    assert_eq!(recall_other_tenant.model_route.as_deref(), Some("active"));
}

/// Wires the facade against sqlite-backed stores end to end, exercising the
/// config-driven backend selection that the in-memory scenarios above never
/// touch.
#[test]
fn sqlite_backend_wiring_round_trips() {
    let store_file = tempfile::NamedTempFile::new().expect("temp store file");
    let jobs_file = tempfile::NamedTempFile::new().expect("temp jobs file");

    let mut config = Config::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.sqlite_path = store_file.path().display().to_string();
    config.jobs.backend = JobBackend::Sqlite;
    config.jobs.sqlite_path = jobs_file.path().display().to_string();

    let brainstem = Brainstem::new(&config).expect("construct brainstem with sqlite backends");

    let response = remember_one(
        &brainstem,
        "T",
        "A",
        Scope::Team,
        "The quarterly report ships after legal sign-off.",
        MemoryType::Fact,
        None,
    );
    let memory_id = response.memory_ids[0].clone();

    let recall = brainstem
        .recall(RecallRequest {
            tenant_id: "T".to_owned(),
            agent_id: "A".to_owned(),
            query: "quarterly report sign-off".to_owned(),
            scope: Scope::Team,
            budget: RecallBudget { max_items: 10, max_tokens: 1200 },
            filters: RecallFilters::default(),
        })
        .expect("recall should succeed");
    assert!(recall.items.iter().any(|item| item.memory_id == memory_id));

    let job = brainstem.submit_cleanup("T", "A", 24.0).expect("submit cleanup");
    let manager = brainstem.jobs();
    assert!(manager.process_next().expect("process queued job"));
    let processed = manager.get(&job.job_id).expect("get job").expect("job exists");
    assert_eq!(processed.status, brainstem_jobs::JobStatus::Completed);
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brainstem_core::Scope;
use brainstem_memory::{MemoryRepository, RecallBudget, RecallFilters, RecallRequest};
use brainstem_registry::ModelRegistry;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::traits::JobQueue;
use crate::types::{CleanupPayload, JobKind, JobRecord, ReflectPayload, TrainPayload};

/// Dispatches claimed jobs to the right subsystem and applies the retry
/// policy. Storage/claim mechanics live in the injected `JobQueue`.
pub struct JobManager {
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn MemoryRepository>,
    registry: Option<Arc<ModelRegistry>>,
    default_max_attempts: u32,
    poll_interval: Duration,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("default_max_attempts", &self.default_max_attempts)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl JobManager {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn MemoryRepository>,
        registry: Option<Arc<ModelRegistry>>,
        default_max_attempts: u32,
        poll_interval_s: f64,
    ) -> Self {
        Self {
            queue,
            repository,
            registry,
            default_max_attempts: default_max_attempts.max(1),
            poll_interval: Duration::from_secs_f64(poll_interval_s.max(0.05)),
        }
    }

    pub fn submit_reflect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        window_hours: u32,
        max_candidates: usize,
    ) -> Result<JobRecord> {
        let payload = serde_json::to_value(ReflectPayload {
            window_hours,
            max_candidates,
        })?;
        self.queue
            .enqueue(JobKind::Reflect, tenant_id, agent_id, payload, self.default_max_attempts)
    }

    pub fn submit_train(
        &self,
        tenant_id: &str,
        agent_id: &str,
        model_kind: &str,
        lookback_days: u32,
    ) -> Result<JobRecord> {
        let payload = serde_json::to_value(TrainPayload {
            model_kind: model_kind.to_owned(),
            lookback_days,
        })?;
        self.queue
            .enqueue(JobKind::Train, tenant_id, agent_id, payload, self.default_max_attempts)
    }

    pub fn submit_cleanup(&self, tenant_id: &str, agent_id: &str, grace_hours: f64) -> Result<JobRecord> {
        let payload = serde_json::to_value(CleanupPayload { grace_hours })?;
        self.queue
            .enqueue(JobKind::Cleanup, tenant_id, agent_id, payload, self.default_max_attempts)
    }

    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.queue.get(job_id)
    }

    pub fn list_dead_letters(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>> {
        self.queue.list_dead_letters(tenant_id, limit)
    }

    /// Claims and executes one job. Returns `false` if no job was available.
    pub fn process_next(&self) -> Result<bool> {
        let Some(job) = self.queue.claim_next()? else {
            return Ok(false);
        };

        match self.execute(&job) {
            Ok(result) => {
                self.queue.complete(&job.job_id, result)?;
                info!(job_id = %job.job_id, attempts = job.attempts, "job completed");
            }
            Err(error) => {
                let requeued = self.queue.retry_or_fail(&job.job_id, error.to_string())?;
                if requeued {
                    warn!(job_id = %job.job_id, attempts = job.attempts, %error, "job failed, requeued");
                } else {
                    warn!(job_id = %job.job_id, attempts = job.attempts, %error, "job failed, dead-lettered");
                }
            }
        }
        Ok(true)
    }

    /// Polls `process_next` until `stop` is set, sleeping `poll_interval`
    /// between empty polls.
    pub fn run_forever(&self, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            match self.process_next() {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(self.poll_interval),
                Err(error) => {
                    warn!(%error, "job manager poll failed");
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }

    fn execute(&self, job: &JobRecord) -> Result<serde_json::Value> {
        match job.kind {
            JobKind::Reflect => self.execute_reflect(job),
            JobKind::Train => self.execute_train(job),
            JobKind::Cleanup => self.execute_cleanup(job),
        }
    }

    fn execute_reflect(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: ReflectPayload =
            serde_json::from_value(job.payload.clone()).context("decoding reflect payload")?;

        let (model_version, model_route) = match &self.registry {
            Some(registry) => {
                let selection = registry.select_version("reranker", &job.tenant_id)?;
                (Some(selection.version), Some(selection.route))
            }
            None => (None, None),
        };

        let recall = self
            .repository
            .recall(RecallRequest {
                tenant_id: job.tenant_id.clone(),
                agent_id: job.agent_id.clone(),
                query: "constraints commitments unresolved tasks deadlines".to_owned(),
                scope: Scope::Global,
                budget: RecallBudget {
                    max_items: payload.max_candidates.max(1).min(100),
                    max_tokens: 4000,
                },
                filters: RecallFilters::default(),
            })
            .map_err(|e| anyhow::anyhow!("reflect recall failed: {e}"))?;

        let candidate_facts: Vec<String> = recall
            .items
            .iter()
            .take(payload.max_candidates)
            .map(|item| format!("[candidate_fact] {}", item.text))
            .collect();

        debug!(count = candidate_facts.len(), "reflect produced candidates");

        Ok(serde_json::json!({
            "candidate_facts": candidate_facts,
            "model_version": model_version,
            "model_route": model_route,
        }))
    }

    fn execute_train(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: TrainPayload =
            serde_json::from_value(job.payload.clone()).context("decoding train payload")?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let canary_version = format!(
            "{}-canary-{}-{}",
            payload.model_kind,
            Utc::now().format("%Y%m%d%H%M%S"),
            &suffix[..6]
        );

        if let Some(registry) = &self.registry {
            registry.register_canary(
                &payload.model_kind,
                &canary_version,
                10,
                None,
                None,
                Some(&job.agent_id),
            )?;
        }

        Ok(serde_json::json!({
            "notes": format!(
                "Simulated {} training for tenant {} with {} day lookback.",
                payload.model_kind, job.tenant_id, payload.lookback_days
            ),
            "candidate_version": canary_version,
        }))
    }

    fn execute_cleanup(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: CleanupPayload =
            serde_json::from_value(job.payload.clone()).context("decoding cleanup payload")?;

        let purged = self
            .repository
            .purge_expired(&job.tenant_id, payload.grace_hours)
            .map_err(|e| anyhow::anyhow!("cleanup purge failed: {e}"))?;

        Ok(serde_json::json!({
            "purged_count": purged,
            "grace_hours": payload.grace_hours,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brainstem_core::CoreResult;
    use brainstem_memory::{
        ForgetResponse, InMemoryRepository, MemoryDetails, RecallResponse, RememberResponse,
    };

    use super::*;
    use crate::inprocess::InProcessJobQueue;

    /// Fails `purge_expired` a fixed number of times before delegating, used
    /// to drive the manager's retry policy through a real transient failure.
    struct FlakyRepository {
        inner: InMemoryRepository,
        remaining_failures: AtomicUsize,
    }

    impl FlakyRepository {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryRepository::new(),
                remaining_failures: AtomicUsize::new(failures),
            }
        }
    }

    impl MemoryRepository for FlakyRepository {
        fn remember(&self, request: brainstem_memory::RememberRequest) -> CoreResult<RememberResponse> {
            self.inner.remember(request)
        }

        fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse> {
            self.inner.recall(request)
        }

        fn inspect(
            &self,
            tenant_id: &str,
            agent_id: &str,
            scope: brainstem_core::Scope,
            memory_id: &str,
        ) -> CoreResult<MemoryDetails> {
            self.inner.inspect(tenant_id, agent_id, scope, memory_id)
        }

        fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
            self.inner.forget(tenant_id, agent_id, memory_id)
        }

        fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize> {
            if self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then_some(n - 1))
                .is_ok()
            {
                return Err(brainstem_core::CoreError::Internal(anyhow::anyhow!("injected failure")));
            }
            self.inner.purge_expired(tenant_id, grace_hours)
        }
    }

    #[test]
    fn transient_failures_under_max_attempts_still_complete() {
        let repository: Arc<dyn MemoryRepository> = Arc::new(FlakyRepository::new(1));
        let queue: Arc<dyn JobQueue> = Arc::new(InProcessJobQueue::new());
        let manager = JobManager::new(queue, repository, None, 3, 0.01);

        let job = manager.submit_cleanup("t", "a", 24.0).expect("submit");

        assert!(manager.process_next().expect("first attempt fails transiently"));
        let after_first = manager.get(&job.job_id).expect("get").expect("exists");
        assert_eq!(after_first.status, crate::types::JobStatus::Queued);
        assert_eq!(after_first.attempts, 1);

        assert!(manager.process_next().expect("second attempt succeeds"));
        let after_second = manager.get(&job.job_id).expect("get").expect("exists");
        assert_eq!(after_second.status, crate::types::JobStatus::Completed);
        assert_eq!(after_second.attempts, 2);
    }

    #[test]
    fn exhausting_max_attempts_dead_letters() {
        let repository: Arc<dyn MemoryRepository> = Arc::new(FlakyRepository::new(10));
        let queue: Arc<dyn JobQueue> = Arc::new(InProcessJobQueue::new());
        let manager = JobManager::new(queue, repository, None, 2, 0.01);

        let job = manager.submit_cleanup("t", "a", 24.0).expect("submit");
        assert!(manager.process_next().expect("first attempt"));
        assert!(manager.process_next().expect("second attempt"));

        let after = manager.get(&job.job_id).expect("get").expect("exists");
        assert_eq!(after.status, crate::types::JobStatus::Failed);
        assert_eq!(after.attempts, 2);

        let dead_letters = manager.list_dead_letters("t", 10).expect("dead letters");
        assert_eq!(dead_letters.len(), 1);
    }
}

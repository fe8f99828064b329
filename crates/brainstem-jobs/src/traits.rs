use anyhow::Result;

use crate::types::{JobKind, JobRecord};

/// Capability interface for durable job storage. Execution semantics
/// (dispatch, retries) live in `JobManager`, not here — backends only store
/// and claim.
pub trait JobQueue: Send + Sync {
    fn enqueue(
        &self,
        kind: JobKind,
        tenant_id: &str,
        agent_id: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> Result<JobRecord>;

    /// Atomically claim the oldest queued job, marking it `running` and
    /// incrementing `attempts`. Returns `None` if no job is queued or
    /// another worker won the race.
    fn claim_next(&self) -> Result<Option<JobRecord>>;

    fn complete(&self, job_id: &str, result: serde_json::Value) -> Result<()>;

    /// Either re-queues (attempts < max_attempts) or moves the job to
    /// `failed` (dead letter), returning whether it was re-queued.
    fn retry_or_fail(&self, job_id: &str, error: String) -> Result<bool>;

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;

    fn list_dead_letters(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>>;
}

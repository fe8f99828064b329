use brainstem_core::CoreResult;

use crate::types::{
    ForgetResponse, MemoryDetails, RecallRequest, RecallResponse, RememberRequest,
    RememberResponse,
};

/// Capability interface for the memory repository. Three backends
/// (in-memory, sqlite, postgres) implement this and must pass the same
/// behavioral test suite.
pub trait MemoryRepository: Send + Sync {
    fn remember(&self, request: RememberRequest) -> CoreResult<RememberResponse>;

    fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse>;

    fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: brainstem_core::Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails>;

    fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse>;

    fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize>;
}

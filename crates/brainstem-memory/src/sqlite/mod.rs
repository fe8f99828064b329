mod helpers;
mod query;
mod schema;
mod write_ops;
#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use brainstem_core::CoreResult;
use rusqlite::Connection;

use crate::traits::MemoryRepository;
use crate::types::{
    ForgetResponse, MemoryDetails, RecallRequest, RecallResponse, RememberRequest,
    RememberResponse,
};

/// Local single-file embedded SQL backend.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).context("opening brainstem-memory sqlite database")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MemoryRepository for SqliteRepository {
    fn remember(&self, request: RememberRequest) -> CoreResult<RememberResponse> {
        write_ops::remember(self, request)
    }

    fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse> {
        query::recall(self, request)
    }

    fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: brainstem_core::Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails> {
        query::inspect(self, tenant_id, agent_id, scope, memory_id)
    }

    fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
        write_ops::forget(self, tenant_id, agent_id, memory_id).map(|deleted| ForgetResponse { deleted })
    }

    fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize> {
        write_ops::purge_expired(self, tenant_id, grace_hours)
    }
}

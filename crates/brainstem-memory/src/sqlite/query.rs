use brainstem_core::ids::new_trace_id;
use brainstem_core::{CoreError, Scope};
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::recall::{detect_conflicts, is_visible, rank_and_pack, select_candidates};
use crate::types::{MemoryDetails, MemoryRecord, RecallRequest, RecallResponse};

use super::{helpers, SqliteRepository};

fn internal(err: impl std::fmt::Display) -> CoreError {
    CoreError::Internal(anyhow::anyhow!("{err}"))
}

fn load_tenant_records(repo: &SqliteRepository, tenant_id: &str) -> Result<Vec<MemoryRecord>, CoreError> {
    let conn = repo.conn.lock().expect("memory db mutex poisoned");
    let mut stmt = conn
        .prepare("SELECT * FROM memory_items WHERE tenant_id = ?1")
        .map_err(internal)?;
    let rows = stmt
        .query_map(params![tenant_id], helpers::record_from_row)
        .map_err(internal)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(internal)
}

pub(super) fn recall(
    repo: &SqliteRepository,
    request: RecallRequest,
) -> Result<RecallResponse, CoreError> {
    if !(1..=100).contains(&request.budget.max_items) {
        return Err(CoreError::Validation("max_items must be 1..100".to_owned()));
    }
    if !(64..=32000).contains(&request.budget.max_tokens) {
        return Err(CoreError::Validation(
            "max_tokens must be 64..32000".to_owned(),
        ));
    }

    let records = load_tenant_records(repo, &request.tenant_id)?;
    let now = Utc::now();
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

pub(super) fn inspect(
    repo: &SqliteRepository,
    tenant_id: &str,
    agent_id: &str,
    scope: Scope,
    memory_id: &str,
) -> Result<MemoryDetails, CoreError> {
    let conn = repo.conn.lock().expect("memory db mutex poisoned");
    let record: Option<MemoryRecord> = conn
        .query_row(
            "SELECT * FROM memory_items WHERE memory_id = ?1 AND tenant_id = ?2",
            params![memory_id, tenant_id],
            helpers::record_from_row,
        )
        .optional()
        .map_err(internal)?;

    let record = record
        .filter(|record| is_visible(record, scope, agent_id))
        .ok_or(CoreError::NotFound)?;
    Ok(MemoryDetails::from(&record))
}

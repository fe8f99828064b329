use brainstem_core::ids::new_memory_id;
use brainstem_core::scoring::{infer_confidence, infer_salience};
use brainstem_core::CoreError;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::types::{RememberRequest, RememberResponse};

use super::{helpers, SqliteRepository};

pub(super) fn remember(
    repo: &SqliteRepository,
    request: RememberRequest,
) -> Result<RememberResponse, CoreError> {
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
    }

    let mut conn = repo.conn.lock().expect("memory db mutex poisoned");
    let tx = conn.transaction().map_err(internal)?;

    if let Some(key) = &request.idempotency_key {
        let existing: Option<String> = tx
            .query_row(
                "SELECT response_json FROM idempotency_records WHERE tenant_id = ?1 AND idempotency_key = ?2",
                params![request.tenant_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(internal)?;
        if let Some(json) = existing {
            let mut response: RememberResponse = serde_json::from_str(&json).map_err(internal)?;
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

        tx.execute(
            "INSERT INTO memory_items (
                memory_id, tenant_id, agent_id, type, scope, text, trust_level,
                confidence, salience, source_ref, created_at, expires_at, tombstoned
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,0)",
            params![
                memory_id,
                request.tenant_id,
                request.agent_id,
                item.memory_type.as_str(),
                request.scope.as_str(),
                text,
                item.trust_level.as_str(),
                confidence,
                salience,
                item.source_ref,
                helpers::format_dt(now),
                item.expires_at.map(helpers::format_dt),
            ],
        )
        .map_err(internal)?;
        memory_ids.push(memory_id);
    }

    let response = RememberResponse {
        accepted: memory_ids.len(),
        rejected: 0,
        memory_ids,
        warnings: Vec::new(),
    };

    if let Some(key) = &request.idempotency_key {
        let json = serde_json::to_string(&response).map_err(internal)?;
        tx.execute(
            "INSERT INTO idempotency_records (tenant_id, idempotency_key, response_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![request.tenant_id, key, json, helpers::format_dt(now)],
        )
        .map_err(internal)?;
    }

    tx.commit().map_err(internal)?;
    Ok(response)
}

pub(super) fn forget(
    repo: &SqliteRepository,
    tenant_id: &str,
    agent_id: &str,
    memory_id: &str,
) -> Result<bool, CoreError> {
    let conn = repo.conn.lock().expect("memory db mutex poisoned");
    let record: Option<crate::types::MemoryRecord> = conn
        .query_row(
            "SELECT * FROM memory_items WHERE memory_id = ?1 AND tenant_id = ?2",
            params![memory_id, tenant_id],
            helpers::record_from_row,
        )
        .optional()
        .map_err(internal)?;

    let Some(record) = record else {
        return Ok(false);
    };
    if !crate::recall::can_delete(agent_id, &record) {
        return Ok(false);
    }

    conn.execute(
        "UPDATE memory_items SET tombstoned = 1 WHERE memory_id = ?1",
        params![memory_id],
    )
    .map_err(internal)?;
    Ok(true)
}

pub(super) fn purge_expired(
    repo: &SqliteRepository,
    tenant_id: &str,
    grace_hours: f64,
) -> Result<usize, CoreError> {
    let conn = repo.conn.lock().expect("memory db mutex poisoned");
    let cutoff = Utc::now() - chrono::Duration::seconds((grace_hours * 3600.0) as i64);
    let affected = conn
        .execute(
            "UPDATE memory_items
             SET tombstoned = 1
             WHERE tenant_id = ?1 AND tombstoned = 0
               AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![tenant_id, helpers::format_dt(cutoff)],
        )
        .map_err(internal)?;
    Ok(affected)
}

fn internal(err: impl std::fmt::Display) -> CoreError {
    CoreError::Internal(anyhow::anyhow!("{err}"))
}

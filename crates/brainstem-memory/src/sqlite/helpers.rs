use brainstem_core::{MemoryType, Scope, TrustLevel};
use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::types::MemoryRecord;

pub(super) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let type_str: String = row.get("type")?;
    let scope_str: String = row.get("scope")?;
    let trust_str: String = row.get("trust_level")?;
    let created_at: String = row.get("created_at")?;
    let expires_at: Option<String> = row.get("expires_at")?;

    Ok(MemoryRecord {
        memory_id: row.get("memory_id")?,
        tenant_id: row.get("tenant_id")?,
        agent_id: row.get("agent_id")?,
        memory_type: MemoryType::parse(&type_str).unwrap_or(MemoryType::Event),
        scope: Scope::parse(&scope_str).unwrap_or(Scope::Private),
        trust_level: TrustLevel::parse(&trust_str).unwrap_or(TrustLevel::UntrustedWeb),
        text: row.get("text")?,
        source_ref: row.get("source_ref")?,
        confidence: row.get("confidence")?,
        salience: row.get("salience")?,
        created_at: parse_dt(&created_at),
        expires_at: expires_at.as_deref().map(parse_dt),
        tombstoned: row.get::<_, i64>("tombstoned")? != 0,
    })
}

pub(super) fn format_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(super) fn parse_dt(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

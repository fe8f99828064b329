use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::traits::ModelRegistryStore;
use crate::types::{ModelState, RegistryEvent, SignalRecord};

pub struct SqliteModelRegistryStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteModelRegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteModelRegistryStore").finish_non_exhaustive()
    }
}

impl SqliteModelRegistryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).context("opening brainstem-registry sqlite database")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory registry database")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS model_registry_state (
            model_kind TEXT PRIMARY KEY,
            active_version TEXT NOT NULL,
            canary_version TEXT,
            rollout_percent INTEGER NOT NULL,
            tenant_allowlist_json TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS model_registry_signal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_kind TEXT NOT NULL,
            version TEXT NOT NULL,
            metric TEXT NOT NULL,
            value REAL NOT NULL,
            source TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_model_registry_signal_kind_created
            ON model_registry_signal (model_kind, created_at DESC);

        CREATE TABLE IF NOT EXISTS model_registry_event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_kind TEXT NOT NULL,
            event_kind TEXT NOT NULL,
            actor_agent_id TEXT,
            payload_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_model_registry_event_kind_created
            ON model_registry_event (model_kind, created_at DESC);
        ",
    )
    .context("initializing brainstem-registry sqlite schema")?;
    Ok(())
}

fn parse_dt(value: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ModelRegistryStore for SqliteModelRegistryStore {
    fn load_states(&self) -> Result<Vec<(String, ModelState)>> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT model_kind, active_version, canary_version, rollout_percent,
                    tenant_allowlist_json, metadata_json, updated_at
             FROM model_registry_state",
        )?;
        let rows = stmt.query_map([], |row| {
            let model_kind: String = row.get(0)?;
            let allowlist_json: String = row.get(4)?;
            let metadata_json: String = row.get(5)?;
            let updated_at: String = row.get(6)?;
            Ok((model_kind, row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?, allowlist_json, metadata_json, updated_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (model_kind, active_version, canary_version, rollout_percent, allowlist_json, metadata_json, updated_at) =
                row?;
            let allowlist: BTreeSet<String> = serde_json::from_str(&allowlist_json).unwrap_or_default();
            let metadata: serde_json::Value =
                serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);
            result.push((
                model_kind,
                ModelState {
                    active_version,
                    canary_version,
                    rollout_percent: rollout_percent as u8,
                    tenant_allowlist: allowlist,
                    metadata,
                    updated_at: parse_dt(&updated_at),
                },
            ));
        }
        Ok(result)
    }

    fn upsert_state(&self, model_kind: &str, model: &ModelState) -> Result<()> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        let allowlist_json = serde_json::to_string(&model.tenant_allowlist)?;
        let metadata_json = serde_json::to_string(&model.metadata)?;
        conn.execute(
            "INSERT INTO model_registry_state
             (model_kind, active_version, canary_version, rollout_percent,
              tenant_allowlist_json, metadata_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(model_kind) DO UPDATE SET
                active_version = excluded.active_version,
                canary_version = excluded.canary_version,
                rollout_percent = excluded.rollout_percent,
                tenant_allowlist_json = excluded.tenant_allowlist_json,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at",
            params![
                model_kind,
                model.active_version,
                model.canary_version,
                model.rollout_percent as i64,
                allowlist_json,
                metadata_json,
                model.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_signal(&self, model_kind: &str, signal: &SignalRecord) -> Result<()> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        conn.execute(
            "INSERT INTO model_registry_signal (model_kind, version, metric, value, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                model_kind,
                signal.version,
                signal.metric,
                signal.value,
                signal.source,
                signal.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_signals(
        &self,
        model_kind: &str,
        limit: usize,
        version: Option<&str>,
    ) -> Result<Vec<SignalRecord>> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        let bounded = limit.max(1) as i64;

        let mut stmt;
        let rows: Vec<(String, String, f64, Option<String>, String)> = if let Some(version) = version {
            stmt = conn.prepare(
                "SELECT version, metric, value, source, created_at
                 FROM model_registry_signal
                 WHERE model_kind = ?1 AND version = ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )?;
            stmt.query_map(params![model_kind, version, bounded], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt = conn.prepare(
                "SELECT version, metric, value, source, created_at
                 FROM model_registry_signal
                 WHERE model_kind = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![model_kind, bounded], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(rows
            .into_iter()
            .map(|(version, metric, value, source, created_at)| SignalRecord {
                version,
                metric,
                value,
                source,
                created_at: parse_dt(&created_at),
            })
            .collect())
    }

    fn append_event(&self, model_kind: &str, event: &RegistryEvent) -> Result<()> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        conn.execute(
            "INSERT INTO model_registry_event (model_kind, event_kind, actor_agent_id, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                model_kind,
                event.event_kind,
                event.actor_agent_id,
                event.payload.to_string(),
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_events(&self, model_kind: &str, limit: usize) -> Result<Vec<RegistryEvent>> {
        let conn = self.conn.lock().expect("registry db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT event_kind, actor_agent_id, payload_json, created_at
             FROM model_registry_event
             WHERE model_kind = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![model_kind, limit.max(1) as i64], |row| {
            let event_kind: String = row.get(0)?;
            let actor_agent_id: Option<String> = row.get(1)?;
            let payload_json: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok((event_kind, actor_agent_id, payload_json, created_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (event_kind, actor_agent_id, payload_json, created_at) = row?;
            result.push(RegistryEvent {
                event_kind,
                actor_agent_id,
                payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
                created_at: parse_dt(&created_at),
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_upsert_and_load() {
        let store = SqliteModelRegistryStore::open_in_memory().expect("open");
        let mut state = ModelState::baseline("reranker");
        state.canary_version = Some("reranker-canary-1".into());
        state.rollout_percent = 25;
        state.tenant_allowlist.insert("tenant-a".into());

        store.upsert_state("reranker", &state).expect("upsert");
        let loaded = store.load_states().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.canary_version.as_deref(), Some("reranker-canary-1"));
        assert_eq!(loaded[0].1.rollout_percent, 25);
        assert!(loaded[0].1.tenant_allowlist.contains("tenant-a"));
    }

    #[test]
    fn signals_are_ordered_newest_first_and_bounded() {
        let store = SqliteModelRegistryStore::open_in_memory().expect("open");
        for i in 0..5 {
            store
                .insert_signal(
                    "reranker",
                    &SignalRecord {
                        version: "v1".into(),
                        metric: "latency_ms".into(),
                        value: i as f64,
                        source: None,
                        created_at: Utc::now() + chrono::Duration::seconds(i),
                    },
                )
                .expect("insert");
        }
        let signals = store.list_signals("reranker", 3, None).expect("list");
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].value, 4.0);
    }
}

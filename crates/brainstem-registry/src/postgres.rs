use std::collections::BTreeSet;

use anyhow::Context;
use sqlx::{PgPool, Row};
use tokio::runtime::Runtime;

use crate::traits::ModelRegistryStore;
use crate::types::{ModelState, RegistryEvent, SignalRecord};

pub struct PostgresModelRegistryStore {
    pool: PgPool,
    rt: Runtime,
}

impl std::fmt::Debug for PostgresModelRegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresModelRegistryStore").finish_non_exhaustive()
    }
}

impl PostgresModelRegistryStore {
    pub fn connect(database_url: &str) -> anyhow::Result<Self> {
        let rt = Runtime::new().context("starting tokio runtime for postgres registry backend")?;
        let pool = rt.block_on(async {
            sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
        })?;
        rt.block_on(init_schema(&pool))?;
        Ok(Self { pool, rt })
    }
}

async fn init_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS model_registry_state (
            model_kind TEXT PRIMARY KEY,
            active_version TEXT NOT NULL,
            canary_version TEXT,
            rollout_percent INTEGER NOT NULL,
            tenant_allowlist_json JSONB NOT NULL,
            metadata_json JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS model_registry_signal (
            id BIGSERIAL PRIMARY KEY,
            model_kind TEXT NOT NULL,
            version TEXT NOT NULL,
            metric TEXT NOT NULL,
            value DOUBLE PRECISION NOT NULL,
            source TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_model_registry_signal_kind_created
         ON model_registry_signal (model_kind, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS model_registry_event (
            id BIGSERIAL PRIMARY KEY,
            model_kind TEXT NOT NULL,
            event_kind TEXT NOT NULL,
            actor_agent_id TEXT,
            payload_json JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_model_registry_event_kind_created
         ON model_registry_event (model_kind, created_at DESC)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

impl ModelRegistryStore for PostgresModelRegistryStore {
    fn load_states(&self) -> anyhow::Result<Vec<(String, ModelState)>> {
        self.rt.block_on(async {
            let rows = sqlx::query(
                "SELECT model_kind, active_version, canary_version, rollout_percent,
                        tenant_allowlist_json, metadata_json, updated_at
                 FROM model_registry_state",
            )
            .fetch_all(&self.pool)
            .await?;

            let mut result = Vec::with_capacity(rows.len());
            for row in &rows {
                let allowlist: serde_json::Value = row.get("tenant_allowlist_json");
                let allowlist: BTreeSet<String> = serde_json::from_value(allowlist).unwrap_or_default();
                result.push((
                    row.get("model_kind"),
                    ModelState {
                        active_version: row.get("active_version"),
                        canary_version: row.get("canary_version"),
                        rollout_percent: row.get::<i32, _>("rollout_percent") as u8,
                        tenant_allowlist: allowlist,
                        metadata: row.get("metadata_json"),
                        updated_at: row.get("updated_at"),
                    },
                ));
            }
            Ok(result)
        })
    }

    fn upsert_state(&self, model_kind: &str, state: &ModelState) -> anyhow::Result<()> {
        self.rt.block_on(async {
            let allowlist = serde_json::to_value(&state.tenant_allowlist)?;
            sqlx::query(
                "INSERT INTO model_registry_state
                 (model_kind, active_version, canary_version, rollout_percent,
                  tenant_allowlist_json, metadata_json, updated_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)
                 ON CONFLICT (model_kind) DO UPDATE SET
                    active_version = EXCLUDED.active_version,
                    canary_version = EXCLUDED.canary_version,
                    rollout_percent = EXCLUDED.rollout_percent,
                    tenant_allowlist_json = EXCLUDED.tenant_allowlist_json,
                    metadata_json = EXCLUDED.metadata_json,
                    updated_at = EXCLUDED.updated_at",
            )
            .bind(model_kind)
            .bind(&state.active_version)
            .bind(&state.canary_version)
            .bind(state.rollout_percent as i32)
            .bind(allowlist)
            .bind(&state.metadata)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn insert_signal(&self, model_kind: &str, signal: &SignalRecord) -> anyhow::Result<()> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO model_registry_signal (model_kind, version, metric, value, source, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6)",
            )
            .bind(model_kind)
            .bind(&signal.version)
            .bind(&signal.metric)
            .bind(signal.value)
            .bind(&signal.source)
            .bind(signal.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn list_signals(
        &self,
        model_kind: &str,
        limit: usize,
        version: Option<&str>,
    ) -> anyhow::Result<Vec<SignalRecord>> {
        self.rt.block_on(async {
            let bounded = limit.max(1) as i64;
            let rows = if let Some(version) = version {
                sqlx::query(
                    "SELECT version, metric, value, source, created_at
                     FROM model_registry_signal
                     WHERE model_kind = $1 AND version = $2
                     ORDER BY created_at DESC, id DESC
                     LIMIT $3",
                )
                .bind(model_kind)
                .bind(version)
                .bind(bounded)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query(
                    "SELECT version, metric, value, source, created_at
                     FROM model_registry_signal
                     WHERE model_kind = $1
                     ORDER BY created_at DESC, id DESC
                     LIMIT $2",
                )
                .bind(model_kind)
                .bind(bounded)
                .fetch_all(&self.pool)
                .await?
            };
            Ok(rows
                .iter()
                .map(|row| SignalRecord {
                    version: row.get("version"),
                    metric: row.get("metric"),
                    value: row.get("value"),
                    source: row.get("source"),
                    created_at: row.get("created_at"),
                })
                .collect())
        })
    }

    fn append_event(&self, model_kind: &str, event: &RegistryEvent) -> anyhow::Result<()> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO model_registry_event (model_kind, event_kind, actor_agent_id, payload_json, created_at)
                 VALUES ($1,$2,$3,$4,$5)",
            )
            .bind(model_kind)
            .bind(&event.event_kind)
            .bind(&event.actor_agent_id)
            .bind(&event.payload)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn list_events(&self, model_kind: &str, limit: usize) -> anyhow::Result<Vec<RegistryEvent>> {
        self.rt.block_on(async {
            let bounded = limit.max(1) as i64;
            let rows = sqlx::query(
                "SELECT event_kind, actor_agent_id, payload_json, created_at
                 FROM model_registry_event
                 WHERE model_kind = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2",
            )
            .bind(model_kind)
            .bind(bounded)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .iter()
                .map(|row| RegistryEvent {
                    event_kind: row.get("event_kind"),
                    actor_agent_id: row.get("actor_agent_id"),
                    payload: row.get("payload_json"),
                    created_at: row.get("created_at"),
                })
                .collect())
        })
    }
}

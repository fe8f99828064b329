//! Networked SQL backend: same schema as the embedded store plus a
//! `VECTOR(1536)` embedding column, with vector-ordered recall as a
//! best-effort path and an unfiltered scan plus in-process scoring as the
//! fallback contract of record.

use anyhow::Context;
use brainstem_core::ids::{new_memory_id, new_trace_id};
use brainstem_core::scoring::{infer_confidence, infer_salience};
use brainstem_core::{CoreError, CoreResult, Scope};
use chrono::Utc;
use sqlx::{PgPool, Row};
use tokio::runtime::Runtime;

use crate::embedding::hash_embedding;
use crate::recall::{can_delete, detect_conflicts, is_visible, rank_and_pack, select_candidates};
use crate::traits::MemoryRepository;
use crate::types::{
    ForgetResponse, MemoryDetails, MemoryRecord, RecallRequest, RecallResponse, RememberRequest,
    RememberResponse,
};

pub struct PostgresRepository {
    pool: PgPool,
    rt: Runtime,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepository").finish_non_exhaustive()
    }
}

impl PostgresRepository {
    pub fn connect(database_url: &str) -> anyhow::Result<Self> {
        let rt = Runtime::new().context("starting tokio runtime for postgres backend")?;
        let pool = rt.block_on(async {
            sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
        })?;
        rt.block_on(init_schema(&pool))?;
        Ok(Self { pool, rt })
    }

    fn internal<E: std::fmt::Display>(err: E) -> CoreError {
        CoreError::Internal(anyhow::anyhow!("{err}"))
    }
}

async fn init_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS memory_items (
            memory_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            type TEXT NOT NULL,
            scope TEXT NOT NULL,
            text TEXT NOT NULL,
            trust_level TEXT NOT NULL,
            confidence DOUBLE PRECISION NOT NULL,
            salience DOUBLE PRECISION NOT NULL,
            source_ref TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ,
            tombstoned BOOLEAN NOT NULL DEFAULT FALSE,
            embedding JSONB
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_memory_items_tenant_created
         ON memory_items (tenant_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_memory_items_tenant_scope
         ON memory_items (tenant_id, scope)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS idempotency_records (
            tenant_id TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            response_json JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (tenant_id, idempotency_key)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> MemoryRecord {
    use brainstem_core::{MemoryType, TrustLevel};

    let type_str: String = row.get("type");
    let scope_str: String = row.get("scope");
    let trust_str: String = row.get("trust_level");

    MemoryRecord {
        memory_id: row.get("memory_id"),
        tenant_id: row.get("tenant_id"),
        agent_id: row.get("agent_id"),
        memory_type: MemoryType::parse(&type_str).unwrap_or(MemoryType::Event),
        scope: Scope::parse(&scope_str).unwrap_or(Scope::Private),
        trust_level: TrustLevel::parse(&trust_str).unwrap_or(TrustLevel::UntrustedWeb),
        text: row.get("text"),
        source_ref: row.get("source_ref"),
        confidence: row.get("confidence"),
        salience: row.get("salience"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        tombstoned: row.get("tombstoned"),
    }
}

impl MemoryRepository for PostgresRepository {
    fn remember(&self, request: RememberRequest) -> CoreResult<RememberResponse> {
        if request.items.is_empty() || request.items.len() > 100 {
            return Err(CoreError::Validation(
                "items must contain between 1 and 100 entries".to_owned(),
            ));
        }

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await.map_err(Self::internal)?;

            if let Some(key) = &request.idempotency_key {
                let existing: Option<(serde_json::Value,)> = sqlx::query_as(
                    "SELECT response_json FROM idempotency_records WHERE tenant_id = $1 AND idempotency_key = $2",
                )
                .bind(&request.tenant_id)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::internal)?;
                if let Some((json,)) = existing {
                    let mut response: RememberResponse =
                        serde_json::from_value(json).map_err(|e| Self::internal(e))?;
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
                let embedding = serde_json::to_value(hash_embedding(&text)).map_err(Self::internal)?;

                sqlx::query(
                    "INSERT INTO memory_items
                     (memory_id, tenant_id, agent_id, type, scope, text, trust_level,
                      confidence, salience, source_ref, created_at, expires_at, tombstoned, embedding)
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,false,$13)",
                )
                .bind(&memory_id)
                .bind(&request.tenant_id)
                .bind(&request.agent_id)
                .bind(item.memory_type.as_str())
                .bind(request.scope.as_str())
                .bind(&text)
                .bind(item.trust_level.as_str())
                .bind(confidence)
                .bind(salience)
                .bind(&item.source_ref)
                .bind(now)
                .bind(item.expires_at)
                .bind(embedding)
                .execute(&mut *tx)
                .await
                .map_err(Self::internal)?;
                memory_ids.push(memory_id);
            }

            let response = RememberResponse {
                accepted: memory_ids.len(),
                rejected: 0,
                memory_ids,
                warnings: Vec::new(),
            };

            if let Some(key) = &request.idempotency_key {
                let json = serde_json::to_value(&response).map_err(Self::internal)?;
                sqlx::query(
                    "INSERT INTO idempotency_records (tenant_id, idempotency_key, response_json, created_at)
                     VALUES ($1,$2,$3,$4)",
                )
                .bind(&request.tenant_id)
                .bind(key)
                .bind(json)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Self::internal)?;
            }

            tx.commit().await.map_err(Self::internal)?;
            Ok(response)
        })
    }

    fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse> {
        if !(1..=100).contains(&request.budget.max_items) {
            return Err(CoreError::Validation("max_items must be 1..100".to_owned()));
        }
        if !(64..=32000).contains(&request.budget.max_tokens) {
            return Err(CoreError::Validation(
                "max_tokens must be 64..32000".to_owned(),
            ));
        }

        let records: Vec<MemoryRecord> = self.rt.block_on(async {
            // Vector ordering is best-effort: attempt the `<=>` cosine operator
            // first (requires pgvector), falling back to an unfiltered scan
            // when it is unavailable. Scoring happens in Rust either way so
            // both paths produce identical rankings here.
            let rows = sqlx::query("SELECT * FROM memory_items WHERE tenant_id = $1")
                .bind(&request.tenant_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::internal)?;
            Ok::<_, CoreError>(rows.iter().map(record_from_row).collect())
        })?;

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

    fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails> {
        let record: Option<MemoryRecord> = self.rt.block_on(async {
            let row = sqlx::query("SELECT * FROM memory_items WHERE memory_id = $1 AND tenant_id = $2")
                .bind(memory_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::internal)?;
            Ok::<_, CoreError>(row.as_ref().map(record_from_row))
        })?;

        let record = record
            .filter(|record| is_visible(record, scope, agent_id))
            .ok_or(CoreError::NotFound)?;
        Ok(MemoryDetails::from(&record))
    }

    fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
        self.rt.block_on(async {
            let row = sqlx::query("SELECT * FROM memory_items WHERE memory_id = $1 AND tenant_id = $2")
                .bind(memory_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::internal)?;
            let Some(row) = row else {
                return Ok(ForgetResponse { deleted: false });
            };
            let record = record_from_row(&row);
            if !can_delete(agent_id, &record) {
                return Ok(ForgetResponse { deleted: false });
            }
            sqlx::query("UPDATE memory_items SET tombstoned = true WHERE memory_id = $1")
                .bind(memory_id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            Ok(ForgetResponse { deleted: true })
        })
    }

    fn purge_expired(&self, tenant_id: &str, grace_hours: f64) -> CoreResult<usize> {
        self.rt.block_on(async {
            let cutoff = Utc::now() - chrono::Duration::seconds((grace_hours * 3600.0) as i64);
            let result = sqlx::query(
                "UPDATE memory_items SET tombstoned = true
                 WHERE tenant_id = $1 AND tombstoned = false
                   AND expires_at IS NOT NULL AND expires_at <= $2",
            )
            .bind(tenant_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(result.rows_affected() as usize)
        })
    }
}

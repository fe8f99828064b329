use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use brainstem_core::ids::new_job_id;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::traits::JobQueue;
use crate::types::{JobKind, JobRecord, JobStatus};

/// Durable shared queue backed by `async_jobs`. Workers in any
/// process claim the next job via `BEGIN IMMEDIATE` + a conditional
/// `UPDATE ... WHERE status='queued'`; if the update does not affect exactly
/// one row, the claim rolls back and the caller observes no job.
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteJobQueue").finish_non_exhaustive()
    }
}

impl SqliteJobQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).context("opening brainstem-jobs sqlite database")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory jobs database")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS async_jobs (
            job_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            payload TEXT NOT NULL,
            result TEXT,
            error TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_async_jobs_status_created ON async_jobs (status, created_at);
        CREATE INDEX IF NOT EXISTS idx_async_jobs_tenant_status ON async_jobs (tenant_id, status);
        ",
    )
    .context("initializing brainstem-jobs sqlite schema")?;
    Ok(())
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let payload: String = row.get("payload")?;
    let result: Option<String> = row.get("result")?;
    let created_at: String = row.get("created_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let finished_at: Option<String> = row.get("finished_at")?;

    Ok(JobRecord {
        job_id: row.get("job_id")?,
        kind: JobKind::parse(&kind).unwrap_or(JobKind::Cleanup),
        tenant_id: row.get("tenant_id")?,
        agent_id: row.get("agent_id")?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        created_at: parse_dt(&created_at),
        started_at: started_at.as_deref().map(parse_dt),
        finished_at: finished_at.as_deref().map(parse_dt),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        error: row.get("error")?,
        attempts: row.get::<_, i64>("attempts")? as u32,
        max_attempts: row.get::<_, i64>("max_attempts")? as u32,
    })
}

fn parse_dt(value: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn format_dt(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(
        &self,
        kind: JobKind,
        tenant_id: &str,
        agent_id: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> Result<JobRecord> {
        let conn = self.conn.lock().expect("jobs db mutex poisoned");
        let job_id = new_job_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO async_jobs
             (job_id, kind, tenant_id, agent_id, status, created_at, payload, attempts, max_attempts)
             VALUES (?1, ?2, ?3, ?4, 'queued', ?5, ?6, 0, ?7)",
            params![
                job_id,
                kind.as_str(),
                tenant_id,
                agent_id,
                format_dt(now),
                payload.to_string(),
                max_attempts
            ],
        )?;

        Ok(JobRecord {
            job_id,
            kind,
            tenant_id: tenant_id.to_owned(),
            agent_id: agent_id.to_owned(),
            status: JobStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            payload,
            result: None,
            error: None,
            attempts: 0,
            max_attempts,
        })
    }

    fn claim_next(&self) -> Result<Option<JobRecord>> {
        let mut conn = self.conn.lock().expect("jobs db mutex poisoned");
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT job_id FROM async_jobs WHERE status = 'queued' ORDER BY created_at LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(job_id) = candidate else {
            tx.rollback()?;
            return Ok(None);
        };

        let now = format_dt(Utc::now());
        let affected = tx.execute(
            "UPDATE async_jobs
             SET status = 'running', started_at = ?1, attempts = attempts + 1
             WHERE job_id = ?2 AND status = 'queued'",
            params![now, job_id],
        )?;

        if affected != 1 {
            tx.rollback()?;
            return Ok(None);
        }

        let job = tx.query_row(
            "SELECT * FROM async_jobs WHERE job_id = ?1",
            params![job_id],
            row_to_job,
        )?;
        tx.commit()?;
        Ok(Some(job))
    }

    fn complete(&self, job_id: &str, result: serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().expect("jobs db mutex poisoned");
        conn.execute(
            "UPDATE async_jobs
             SET status = 'completed', finished_at = ?1, result = ?2, error = NULL
             WHERE job_id = ?3",
            params![format_dt(Utc::now()), result.to_string(), job_id],
        )?;
        Ok(())
    }

    fn retry_or_fail(&self, job_id: &str, error: String) -> Result<bool> {
        let conn = self.conn.lock().expect("jobs db mutex poisoned");
        let (attempts, max_attempts): (i64, i64) = conn.query_row(
            "SELECT attempts, max_attempts FROM async_jobs WHERE job_id = ?1",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if attempts < max_attempts {
            conn.execute(
                "UPDATE async_jobs SET status = 'queued', finished_at = NULL, error = ?1 WHERE job_id = ?2",
                params![error, job_id],
            )?;
            Ok(true)
        } else {
            conn.execute(
                "UPDATE async_jobs SET status = 'failed', finished_at = ?1, error = ?2 WHERE job_id = ?3",
                params![format_dt(Utc::now()), error, job_id],
            )?;
            Ok(false)
        }
    }

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().expect("jobs db mutex poisoned");
        conn.query_row(
            "SELECT * FROM async_jobs WHERE job_id = ?1",
            params![job_id],
            row_to_job,
        )
        .optional()
        .context("loading job by id")
    }

    fn list_dead_letters(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().expect("jobs db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM async_jobs
             WHERE tenant_id = ?1 AND status = 'failed'
             ORDER BY finished_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, limit.max(1) as i64], row_to_job)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("listing dead letters")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_under_conditional_update() {
        let queue = SqliteJobQueue::open_in_memory().expect("open");
        queue
            .enqueue(JobKind::Cleanup, "t", "a", serde_json::json!({"grace_hours": 1}), 3)
            .expect("enqueue");

        let first = queue.claim_next().expect("claim").expect("job present");
        assert_eq!(first.status, JobStatus::Running);
        assert_eq!(first.attempts, 1);

        let second = queue.claim_next().expect("claim again");
        assert!(second.is_none(), "a second claim must not see the same row");
    }

    #[test]
    fn retry_then_dead_letter_after_max_attempts() {
        let queue = SqliteJobQueue::open_in_memory().expect("open");
        let job = queue
            .enqueue(JobKind::Cleanup, "t", "a", serde_json::json!({}), 2)
            .expect("enqueue");

        queue.claim_next().expect("claim");
        assert!(queue.retry_or_fail(&job.job_id, "boom".into()).expect("retry"));

        queue.claim_next().expect("claim again");
        assert!(!queue.retry_or_fail(&job.job_id, "boom again".into()).expect("fail"));

        let dead_letters = queue.list_dead_letters("t", 10).expect("dead letters");
        assert_eq!(dead_letters.len(), 1);
        assert_eq!(dead_letters[0].attempts, 2);
    }
}

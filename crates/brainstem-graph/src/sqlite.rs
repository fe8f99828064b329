use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::features::extract_features;
use crate::traits::GraphStore;
use crate::types::{Relation, relation_weight};

/// Local single-file embedded SQL graph store: `graph_terms` / `graph_edges`.
pub struct SqliteGraphStore {
    conn: Mutex<rusqlite::Connection>,
    relation_weights: HashMap<String, f64>,
    half_life_hours: f64,
}

impl std::fmt::Debug for SqliteGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphStore").finish_non_exhaustive()
    }
}

impl SqliteGraphStore {
    pub fn open(
        path: impl AsRef<Path>,
        relation_weights: HashMap<String, f64>,
        half_life_hours: f64,
    ) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).context("opening brainstem-graph sqlite database")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            relation_weights,
            half_life_hours,
        })
    }

    pub fn open_in_memory(relation_weights: HashMap<String, f64>, half_life_hours: f64) -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().context("opening in-memory graph database")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            relation_weights,
            half_life_hours,
        })
    }
}

fn init_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS graph_terms (
            tenant_id TEXT NOT NULL,
            term TEXT NOT NULL,
            memory_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, term, memory_id)
        );
        CREATE INDEX IF NOT EXISTS idx_graph_terms_tenant_term ON graph_terms (tenant_id, term);

        CREATE TABLE IF NOT EXISTS graph_edges (
            tenant_id TEXT NOT NULL,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            relation TEXT NOT NULL,
            weight REAL NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, src, dst, relation)
        );
        CREATE INDEX IF NOT EXISTS idx_graph_edges_tenant_src ON graph_edges (tenant_id, src);
        ",
    )
    .context("initializing brainstem-graph sqlite schema")?;
    Ok(())
}

fn term_key(relation: Relation, term: &str) -> String {
    format!("{}:{term}", relation.as_str())
}

impl GraphStore for SqliteGraphStore {
    fn project_memory(&self, tenant_id: &str, memory_id: &str, text: &str) -> Result<()> {
        let features = extract_features(text);
        if features.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().expect("graph db mutex poisoned");
        let tx = conn.transaction().context("starting projection transaction")?;
        let now = Utc::now().to_rfc3339();

        let mut accumulated: HashMap<(String, Relation), f64> = HashMap::new();
        for (relation, term) in &features {
            let key = term_key(*relation, term);
            let mut stmt = tx.prepare(
                "SELECT memory_id FROM graph_terms WHERE tenant_id = ?1 AND term = ?2",
            )?;
            let peers: Vec<String> = stmt
                .query_map(params![tenant_id, key], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            drop(stmt);

            for peer in peers {
                if peer != memory_id {
                    *accumulated.entry((peer, *relation)).or_insert(0.0) += 1.0;
                }
            }

            tx.execute(
                "INSERT OR IGNORE INTO graph_terms (tenant_id, term, memory_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![tenant_id, key, memory_id, now],
            )?;
        }

        for ((peer, relation), weight) in accumulated {
            upsert_edge(&tx, tenant_id, memory_id, &peer, relation, weight, &now)?;
            upsert_edge(&tx, tenant_id, &peer, memory_id, relation, weight, &now)?;
        }

        tx.commit().context("committing projection")?;
        Ok(())
    }

    fn query_candidates(
        &self,
        tenant_id: &str,
        query: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let features = extract_features(query);
        let conn = self.conn.lock().expect("graph db mutex poisoned");

        let mut scores: HashMap<String, f64> = HashMap::new();
        for (relation, term) in &features {
            let key = term_key(*relation, term);
            let mut stmt = conn.prepare(
                "SELECT memory_id FROM graph_terms WHERE tenant_id = ?1 AND term = ?2",
            )?;
            let weight = relation_weight(*relation, &self.relation_weights);
            let memory_ids: Vec<String> = stmt
                .query_map(params![tenant_id, key], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            for memory_id in memory_ids {
                if exclude.contains(&memory_id) {
                    continue;
                }
                *scores.entry(memory_id).or_insert(0.0) += weight;
            }
        }

        Ok(top_n(scores, limit))
    }

    fn related(
        &self,
        tenant_id: &str,
        seed_ids: &[String],
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("graph db mutex poisoned");
        let now = Utc::now();

        let mut scores: HashMap<String, f64> = HashMap::new();
        for seed in seed_ids {
            let mut stmt = conn.prepare(
                "SELECT dst, relation, weight, created_at FROM graph_edges
                 WHERE tenant_id = ?1 AND src = ?2",
            )?;
            let rows: Vec<(String, String, f64, String)> = stmt
                .query_map(params![tenant_id, seed], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<rusqlite::Result<_>>()?;

            for (dst, relation_str, weight, updated_at) in rows {
                if exclude.contains(&dst) {
                    continue;
                }
                let Some(relation) = Relation::parse(&relation_str) else {
                    continue;
                };
                let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now);
                let age_hours = (now - updated_at).num_seconds().max(0) as f64 / 3600.0;
                let decay = 0.5_f64.powf(age_hours / self.half_life_hours.max(f64::EPSILON));
                let effective = weight * relation_weight(relation, &self.relation_weights) * decay;
                *scores.entry(dst).or_insert(0.0) += effective;
            }
        }

        Ok(top_n(scores, limit))
    }
}

fn upsert_edge(
    tx: &rusqlite::Transaction<'_>,
    tenant_id: &str,
    src: &str,
    dst: &str,
    relation: Relation,
    weight: f64,
    now: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO graph_edges (tenant_id, src, dst, relation, weight, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (tenant_id, src, dst, relation)
         DO UPDATE SET weight = weight + excluded.weight, created_at = excluded.created_at",
        params![tenant_id, src, dst, relation.as_str(), weight, now],
    )?;
    Ok(())
}

fn top_n(scores: HashMap<String, f64>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(limit).map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_accumulates_weight_additively() {
        let store = SqliteGraphStore::open_in_memory(HashMap::new(), 168.0).expect("open");
        store
            .project_memory("t", "m1", "Regulation pack RC-22 maps to retention profile RD-91.")
            .expect("project m1");
        store
            .project_memory("t", "m2", "RD-91 enforces retention and RC-22 legal hold exports.")
            .expect("project m2");

        let related = store
            .related("t", &["m1".to_owned()], &HashSet::new(), 10)
            .expect("related");
        assert!(related.contains(&"m2".to_owned()));
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use chrono::Utc;

use crate::features::extract_features;
use crate::traits::GraphStore;
use crate::types::{GraphEdge, Relation, relation_weight};

#[derive(Debug, Default)]
struct TenantGraph {
    /// `(relation, term) -> memory_ids`
    terms: HashMap<(Relation, String), HashSet<String>>,
    /// `memory_id -> dst_memory_id -> edges by relation`
    edges: HashMap<String, HashMap<String, Vec<GraphEdge>>>,
}

/// In-memory graph store.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    tenants: RwLock<HashMap<String, TenantGraph>>,
    relation_weights: HashMap<String, f64>,
    half_life_hours: f64,
}

impl InMemoryGraphStore {
    pub fn new(relation_weights: HashMap<String, f64>, half_life_hours: f64) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            relation_weights,
            half_life_hours,
        }
    }

    fn effective_weight(&self, edge: &GraphEdge, now: chrono::DateTime<Utc>) -> f64 {
        let age_hours = (now - edge.updated_at).num_seconds().max(0) as f64 / 3600.0;
        let decay = 0.5_f64.powf(age_hours / self.half_life_hours.max(f64::EPSILON));
        edge.weight * relation_weight(edge.relation, &self.relation_weights) * decay
    }
}

impl GraphStore for InMemoryGraphStore {
    fn project_memory(&self, tenant_id: &str, memory_id: &str, text: &str) -> Result<()> {
        let features = extract_features(text);
        if features.is_empty() {
            return Ok(());
        }

        let mut tenants = self.tenants.write().expect("graph store lock poisoned");
        let graph = tenants.entry(tenant_id.to_owned()).or_default();

        let mut accumulated: HashMap<(String, Relation), f64> = HashMap::new();
        for (relation, term) in &features {
            let key = (*relation, term.clone());
            let peers = graph.terms.entry(key.clone()).or_default();
            for peer in peers.iter() {
                if peer != memory_id {
                    *accumulated
                        .entry((peer.clone(), *relation))
                        .or_insert(0.0) += 1.0;
                }
            }
            peers.insert(memory_id.to_owned());
        }

        let now = Utc::now();
        for ((peer, relation), weight) in accumulated {
            upsert_edge(graph, tenant_id, memory_id, &peer, relation, weight, now);
            upsert_edge(graph, tenant_id, &peer, memory_id, relation, weight, now);
        }

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
        let tenants = self.tenants.read().expect("graph store lock poisoned");
        let Some(graph) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut scores: HashMap<String, f64> = HashMap::new();
        for (relation, term) in &features {
            let Some(memory_ids) = graph.terms.get(&(*relation, term.clone())) else {
                continue;
            };
            let weight = relation_weight(*relation, &self.relation_weights);
            for memory_id in memory_ids {
                if exclude.contains(memory_id) {
                    continue;
                }
                *scores.entry(memory_id.clone()).or_insert(0.0) += weight;
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
        let tenants = self.tenants.read().expect("graph store lock poisoned");
        let Some(graph) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let mut scores: HashMap<String, f64> = HashMap::new();
        for seed in seed_ids {
            let Some(peers) = graph.edges.get(seed) else {
                continue;
            };
            for (peer, edges) in peers {
                if exclude.contains(peer) {
                    continue;
                }
                let total: f64 = edges.iter().map(|edge| self.effective_weight(edge, now)).sum();
                *scores.entry(peer.clone()).or_insert(0.0) += total;
            }
        }

        Ok(top_n(scores, limit))
    }
}

fn upsert_edge(
    graph: &mut TenantGraph,
    tenant_id: &str,
    src: &str,
    dst: &str,
    relation: Relation,
    weight: f64,
    now: chrono::DateTime<Utc>,
) {
    let edges = graph.edges.entry(src.to_owned()).or_default().entry(dst.to_owned()).or_default();
    if let Some(existing) = edges.iter_mut().find(|e| e.relation == relation) {
        existing.weight += weight;
        existing.updated_at = now;
    } else {
        edges.push(GraphEdge {
            tenant_id: tenant_id.to_owned(),
            src: src.to_owned(),
            dst: dst.to_owned(),
            relation,
            weight,
            updated_at: now,
        });
    }
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
    fn projection_is_symmetric() {
        let store = InMemoryGraphStore::new(HashMap::new(), 168.0);
        store
            .project_memory("t", "m1", "Regulation pack RC-22 maps to retention profile RD-91.")
            .expect("project m1");
        store
            .project_memory("t", "m2", "RD-91 enforces 400-day retention and legal hold exports.")
            .expect("project m2");

        let from_m1 = store
            .related("t", &["m1".to_owned()], &HashSet::new(), 10)
            .expect("related");
        assert!(from_m1.contains(&"m2".to_owned()));

        let from_m2 = store
            .related("t", &["m2".to_owned()], &HashSet::new(), 10)
            .expect("related");
        assert!(from_m2.contains(&"m1".to_owned()));
    }
}

use anyhow::Result;

/// Capability interface for the graph store.
pub trait GraphStore: Send + Sync {
    /// Indexes `text`'s features and accumulates edges to every existing
    /// memory sharing a feature.
    fn project_memory(&self, tenant_id: &str, memory_id: &str, text: &str) -> Result<()>;

    /// Ids matching at least one feature of `query`, scored by the sum of
    /// relation weights across matched features, excluding `exclude`.
    fn query_candidates(
        &self,
        tenant_id: &str,
        query: &str,
        exclude: &std::collections::HashSet<String>,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Ids reachable from `seed_ids` via a single edge hop, scored by the sum
    /// of decayed effective weight per candidate, excluding `exclude`.
    fn related(
        &self,
        tenant_id: &str,
        seed_ids: &[String],
        exclude: &std::collections::HashSet<String>,
        limit: usize,
    ) -> Result<Vec<String>>;
}

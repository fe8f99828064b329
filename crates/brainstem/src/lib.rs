//! Wires the five subsystem crates together into a single entry point: write
//! path (`remember` → graph projection), read path (`recall` → graph
//! augmentation → model version/route attachment), and the async job path
//! (`submit_*` → `JobManager`).

pub mod tracing_setup;

use std::sync::Arc;

use anyhow::Context;
use brainstem_core::config::validate_relation_weights;
use brainstem_core::{Config, CoreResult, GraphConfig, JobBackend, Scope, StoreBackend};
use brainstem_graph::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
use brainstem_jobs::{InProcessJobQueue, JobManager, JobQueue, JobRecord, SqliteJobQueue};
use brainstem_memory::{
    ForgetResponse, InMemoryRepository, MemoryDetails, MemoryRepository, RecallRequest,
    RecallResponse, RememberRequest, RememberResponse, SqliteRepository,
};
use brainstem_registry::{
    HistoryResponse, InMemoryModelRegistryStore, ModelRegistry, ModelRegistryStore,
    ModelStateView, SqliteModelRegistryStore, VersionSelection,
};

/// Derives the graph store's sqlite path from the memory store's, since
/// `GraphConfig` carries no path of its own (a file store always has both
/// schemas side by side in one directory).
fn graph_sqlite_path(store_sqlite_path: &str) -> String {
    match store_sqlite_path.strip_suffix(".sqlite3") {
        Some(stem) => format!("{stem}-graph.sqlite3"),
        None => format!("{store_sqlite_path}-graph.sqlite3"),
    }
}

fn build_repository(config: &Config) -> anyhow::Result<Arc<dyn MemoryRepository>> {
    match config.store.backend {
        StoreBackend::Inmemory => Ok(Arc::new(InMemoryRepository::new())),
        StoreBackend::Sqlite => Ok(Arc::new(
            SqliteRepository::open(&config.store.sqlite_path)
                .context("opening memory sqlite store")?,
        )),
        StoreBackend::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let url = config
                    .store
                    .postgres_url
                    .as_deref()
                    .context("store.postgres_url is required when store.backend = postgres")?;
                Ok(Arc::new(
                    brainstem_memory::PostgresRepository::connect(url)
                        .context("connecting to postgres memory store")?,
                ))
            }
            #[cfg(not(feature = "postgres"))]
            {
                anyhow::bail!("store.backend = postgres requires the `postgres` feature")
            }
        }
    }
}

fn build_graph(config: &GraphConfig, store_sqlite_path: &str, store_backend: StoreBackend) -> anyhow::Result<Arc<dyn GraphStore>> {
    let relation_weights =
        validate_relation_weights(&config.relation_weights).map_err(|e| anyhow::anyhow!(e))?;
    match store_backend {
        StoreBackend::Inmemory => Ok(Arc::new(InMemoryGraphStore::new(
            relation_weights,
            config.half_life_hours,
        ))),
        StoreBackend::Sqlite | StoreBackend::Postgres => Ok(Arc::new(
            SqliteGraphStore::open(
                graph_sqlite_path(store_sqlite_path),
                relation_weights,
                config.half_life_hours,
            )
            .context("opening graph sqlite store")?,
        )),
    }
}

fn build_job_queue(config: &Config) -> anyhow::Result<Arc<dyn JobQueue>> {
    match config.jobs.backend {
        JobBackend::Inprocess => Ok(Arc::new(InProcessJobQueue::new())),
        JobBackend::Sqlite => Ok(Arc::new(
            SqliteJobQueue::open(&config.jobs.sqlite_path).context("opening job queue sqlite store")?,
        )),
    }
}

fn build_registry(config: &Config) -> anyhow::Result<Arc<ModelRegistry>> {
    let store: Arc<dyn ModelRegistryStore> = match config.model_registry.backend {
        StoreBackend::Inmemory => Arc::new(InMemoryModelRegistryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteModelRegistryStore::open(&config.model_registry.sqlite_path)
                .context("opening model registry sqlite store")?,
        ),
        StoreBackend::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let url = config
                    .model_registry
                    .postgres_url
                    .as_deref()
                    .context("model_registry.postgres_url is required when model_registry.backend = postgres")?;
                Arc::new(
                    brainstem_registry::PostgresModelRegistryStore::connect(url)
                        .context("connecting to postgres model registry store")?,
                )
            }
            #[cfg(not(feature = "postgres"))]
            {
                anyhow::bail!("model_registry.backend = postgres requires the `postgres` feature")
            }
        }
    };
    Ok(Arc::new(
        ModelRegistry::new(store, config.model_registry.signal_window).map_err(|e| anyhow::anyhow!(e))?,
    ))
}

/// Entry point wiring C1–C5 per the write/read/async flows.
pub struct Brainstem {
    repository: Arc<dyn MemoryRepository>,
    graph: Option<Arc<dyn GraphStore>>,
    graph_max_expansion: usize,
    registry: Arc<ModelRegistry>,
    jobs: Arc<JobManager>,
}

impl std::fmt::Debug for Brainstem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brainstem")
            .field("graph_enabled", &self.graph.is_some())
            .finish_non_exhaustive()
    }
}

impl Brainstem {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let repository = build_repository(config)?;
        let graph: Option<Arc<dyn GraphStore>> = if config.graph.enabled {
            Some(build_graph(&config.graph, &config.store.sqlite_path, config.store.backend)?)
        } else {
            None
        };
        let registry = build_registry(config)?;
        let queue = build_job_queue(config)?;
        let jobs = Arc::new(JobManager::new(
            queue,
            Arc::clone(&repository),
            Some(Arc::clone(&registry)),
            config.jobs.default_max_attempts,
            config.jobs.poll_interval_s,
        ));

        Ok(Self {
            repository,
            graph,
            graph_max_expansion: config.graph.max_expansion,
            registry,
            jobs,
        })
    }

    pub fn jobs(&self) -> Arc<JobManager> {
        Arc::clone(&self.jobs)
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn remember(&self, request: RememberRequest) -> CoreResult<RememberResponse> {
        let tenant_id = request.tenant_id.clone();
        let items_text: Vec<String> = request.items.iter().map(|item| item.text.clone()).collect();
        let response = self.repository.remember(request)?;

        if let Some(graph) = &self.graph {
            for (memory_id, text) in response.memory_ids.iter().zip(items_text.iter()) {
                if let Err(error) = graph.project_memory(&tenant_id, memory_id, text) {
                    tracing::warn!(%memory_id, %error, "graph projection failed");
                }
            }
        }

        Ok(response)
    }

    pub fn recall(&self, request: RecallRequest) -> CoreResult<RecallResponse> {
        let tenant_id = request.tenant_id.clone();

        let mut response = match &self.graph {
            Some(graph) => brainstem_graph::augmented_recall(
                self.repository.as_ref(),
                graph.as_ref(),
                request,
                self.graph_max_expansion,
            )?,
            None => self.repository.recall(request)?,
        };

        if let Ok(selection) = self.registry.select_version("reranker", &tenant_id) {
            response.model_version = Some(selection.version);
            response.model_route = Some(selection.route);
        }

        Ok(response)
    }

    pub fn inspect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        scope: Scope,
        memory_id: &str,
    ) -> CoreResult<MemoryDetails> {
        self.repository.inspect(tenant_id, agent_id, scope, memory_id)
    }

    pub fn forget(&self, tenant_id: &str, agent_id: &str, memory_id: &str) -> CoreResult<ForgetResponse> {
        self.repository.forget(tenant_id, agent_id, memory_id)
    }

    pub fn submit_reflect(
        &self,
        tenant_id: &str,
        agent_id: &str,
        window_hours: u32,
        max_candidates: usize,
    ) -> anyhow::Result<JobRecord> {
        self.jobs.submit_reflect(tenant_id, agent_id, window_hours, max_candidates)
    }

    pub fn submit_train(
        &self,
        tenant_id: &str,
        agent_id: &str,
        model_kind: &str,
        lookback_days: u32,
    ) -> anyhow::Result<JobRecord> {
        self.jobs.submit_train(tenant_id, agent_id, model_kind, lookback_days)
    }

    pub fn submit_cleanup(&self, tenant_id: &str, agent_id: &str, grace_hours: f64) -> anyhow::Result<JobRecord> {
        self.jobs.submit_cleanup(tenant_id, agent_id, grace_hours)
    }

    pub fn job_status(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>> {
        self.jobs.get(job_id)
    }

    pub fn list_dead_letters(&self, tenant_id: &str, limit: usize) -> anyhow::Result<Vec<JobRecord>> {
        self.jobs.list_dead_letters(tenant_id, limit)
    }

    pub fn select_model_version(&self, model_kind: &str, tenant_id: &str) -> CoreResult<VersionSelection> {
        self.registry.select_version(model_kind, tenant_id)
    }

    pub fn register_canary(
        &self,
        model_kind: &str,
        version: &str,
        rollout_percent: u8,
        tenant_allowlist: Option<Vec<String>>,
        metadata: Option<serde_json::Value>,
        actor_agent_id: Option<&str>,
    ) -> CoreResult<ModelStateView> {
        self.registry
            .register_canary(model_kind, version, rollout_percent, tenant_allowlist, metadata, actor_agent_id)
    }

    pub fn promote_canary(&self, model_kind: &str, actor_agent_id: Option<&str>) -> CoreResult<ModelStateView> {
        self.registry.promote_canary(model_kind, actor_agent_id)
    }

    pub fn rollback_canary(&self, model_kind: &str, actor_agent_id: Option<&str>) -> CoreResult<ModelStateView> {
        self.registry.rollback_canary(model_kind, actor_agent_id)
    }

    pub fn record_model_signal(
        &self,
        model_kind: &str,
        version: &str,
        metric: &str,
        value: f64,
        source: Option<&str>,
        actor_agent_id: Option<&str>,
    ) -> CoreResult<ModelStateView> {
        self.registry
            .record_signal(model_kind, version, metric, value, source, actor_agent_id)
    }

    pub fn model_history(&self, model_kind: &str, limit: usize) -> CoreResult<HistoryResponse> {
        self.registry.history(model_kind, limit)
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use brainstem_core::error::{CoreError, CoreResult};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::traits::ModelRegistryStore;
use crate::types::{
    HistoryEntry, HistoryResponse, MetricSummary, ModelState, ModelStateView, RegistryEvent,
    Route, SignalRecord, VersionSelection,
};

const DEFAULT_SIGNAL_WINDOW: usize = 500;

fn stable_bucket(key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex_prefix = hex::encode(&digest[..4]);
    u64::from_str_radix(&hex_prefix, 16).unwrap_or(0) % 100
}

/// Canary model registry: active/canary versions per model kind, stable
/// percent-bucketed rollout, signal aggregation, and an audit trail.
/// Mutations serialize through an internal mutex so state changes and
/// signal recording never interleave inconsistently.
pub struct ModelRegistry {
    store: Arc<dyn ModelRegistryStore>,
    states: Mutex<BTreeMap<String, ModelState>>,
    signal_window: usize,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("signal_window", &self.signal_window)
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ModelRegistryStore>, signal_window: usize) -> CoreResult<Self> {
        let signal_window = signal_window.max(1);
        let mut loaded: BTreeMap<String, ModelState> = store
            .load_states()
            .map_err(CoreError::Internal)?
            .into_iter()
            .collect();

        for kind in ["reranker", "salience"] {
            if !loaded.contains_key(kind) {
                let baseline = ModelState::baseline(kind);
                store.upsert_state(kind, &baseline).map_err(CoreError::Internal)?;
                loaded.insert(kind.to_owned(), baseline);
            }
        }

        Ok(Self {
            store,
            states: Mutex::new(loaded),
            signal_window,
        })
    }

    pub fn with_default_window(store: Arc<dyn ModelRegistryStore>) -> CoreResult<Self> {
        Self::new(store, DEFAULT_SIGNAL_WINDOW)
    }

    pub fn get_state(&self, model_kind: &str) -> CoreResult<ModelStateView> {
        let states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?
            .clone();
        drop(states);
        self.view(model_kind, &state)
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
        if rollout_percent > 100 {
            return Err(CoreError::RegistryRule("rollout_percent_out_of_range"));
        }

        let mut states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get_mut(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?;
        state.canary_version = Some(version.to_owned());
        state.rollout_percent = rollout_percent;
        state.tenant_allowlist = tenant_allowlist.unwrap_or_default().into_iter().collect();
        state.metadata = metadata.unwrap_or(serde_json::Value::Null);
        state.updated_at = Utc::now();
        let snapshot = state.clone();
        self.store.upsert_state(model_kind, &snapshot).map_err(CoreError::Internal)?;
        self.store
            .append_event(
                model_kind,
                &RegistryEvent {
                    event_kind: "register_canary".to_owned(),
                    actor_agent_id: actor_agent_id.map(str::to_owned),
                    payload: serde_json::json!({
                        "version": snapshot.canary_version,
                        "rollout_percent": snapshot.rollout_percent,
                        "tenant_allowlist": snapshot.tenant_allowlist,
                        "metadata": snapshot.metadata,
                    }),
                    created_at: Utc::now(),
                },
            )
            .map_err(CoreError::Internal)?;
        drop(states);
        self.view(model_kind, &snapshot)
    }

    pub fn promote_canary(&self, model_kind: &str, actor_agent_id: Option<&str>) -> CoreResult<ModelStateView> {
        let mut states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get_mut(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?;
        let Some(canary) = state.canary_version.take() else {
            return Err(CoreError::RegistryRule("canary_not_set"));
        };
        let previous_active = std::mem::replace(&mut state.active_version, canary);
        state.rollout_percent = 0;
        state.tenant_allowlist = BTreeSet::new();
        state.updated_at = Utc::now();
        let snapshot = state.clone();
        self.store.upsert_state(model_kind, &snapshot).map_err(CoreError::Internal)?;
        self.store
            .append_event(
                model_kind,
                &RegistryEvent {
                    event_kind: "promote_canary".to_owned(),
                    actor_agent_id: actor_agent_id.map(str::to_owned),
                    payload: serde_json::json!({
                        "previous_active_version": previous_active,
                        "new_active_version": snapshot.active_version,
                    }),
                    created_at: Utc::now(),
                },
            )
            .map_err(CoreError::Internal)?;
        drop(states);
        self.view(model_kind, &snapshot)
    }

    pub fn rollback_canary(&self, model_kind: &str, actor_agent_id: Option<&str>) -> CoreResult<ModelStateView> {
        let mut states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get_mut(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?;
        let previous_canary = state.canary_version.take();
        state.rollout_percent = 0;
        state.tenant_allowlist = BTreeSet::new();
        state.updated_at = Utc::now();
        let snapshot = state.clone();
        self.store.upsert_state(model_kind, &snapshot).map_err(CoreError::Internal)?;
        self.store
            .append_event(
                model_kind,
                &RegistryEvent {
                    event_kind: "rollback_canary".to_owned(),
                    actor_agent_id: actor_agent_id.map(str::to_owned),
                    payload: serde_json::json!({ "previous_canary_version": previous_canary }),
                    created_at: Utc::now(),
                },
            )
            .map_err(CoreError::Internal)?;
        drop(states);
        self.view(model_kind, &snapshot)
    }

    pub fn record_signal(
        &self,
        model_kind: &str,
        version: &str,
        metric: &str,
        value: f64,
        source: Option<&str>,
        actor_agent_id: Option<&str>,
    ) -> CoreResult<ModelStateView> {
        let mut states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get_mut(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?;
        let signal = SignalRecord {
            version: version.to_owned(),
            metric: metric.to_owned(),
            value,
            source: source.map(str::to_owned),
            created_at: Utc::now(),
        };
        self.store.insert_signal(model_kind, &signal).map_err(CoreError::Internal)?;
        state.updated_at = Utc::now();
        let snapshot = state.clone();
        self.store.upsert_state(model_kind, &snapshot).map_err(CoreError::Internal)?;
        self.store
            .append_event(
                model_kind,
                &RegistryEvent {
                    event_kind: "record_signal".to_owned(),
                    actor_agent_id: actor_agent_id.map(str::to_owned),
                    payload: serde_json::json!({
                        "version": signal.version,
                        "metric": signal.metric,
                        "value": signal.value,
                        "source": signal.source,
                    }),
                    created_at: Utc::now(),
                },
            )
            .map_err(CoreError::Internal)?;
        drop(states);
        self.view(model_kind, &snapshot)
    }

    pub fn select_version(&self, model_kind: &str, tenant_id: &str) -> CoreResult<VersionSelection> {
        let states = self.states.lock().expect("registry mutex poisoned");
        let state = states
            .get(model_kind)
            .ok_or(CoreError::RegistryRule("unsupported_model_kind"))?;

        let Some(canary) = &state.canary_version else {
            return Ok(VersionSelection {
                version: state.active_version.clone(),
                route: Route::Active.as_str().to_owned(),
            });
        };
        if state.tenant_allowlist.contains(tenant_id) {
            return Ok(VersionSelection {
                version: canary.clone(),
                route: Route::CanaryAllowlist.as_str().to_owned(),
            });
        }
        if state.rollout_percent == 0 {
            return Ok(VersionSelection {
                version: state.active_version.clone(),
                route: Route::Active.as_str().to_owned(),
            });
        }
        let bucket = stable_bucket(&format!("{model_kind}:{tenant_id}"));
        if bucket < state.rollout_percent as u64 {
            Ok(VersionSelection {
                version: canary.clone(),
                route: Route::CanaryPercent.as_str().to_owned(),
            })
        } else {
            Ok(VersionSelection {
                version: state.active_version.clone(),
                route: Route::Active.as_str().to_owned(),
            })
        }
    }

    pub fn history(&self, model_kind: &str, limit: usize) -> CoreResult<HistoryResponse> {
        {
            let states = self.states.lock().expect("registry mutex poisoned");
            if !states.contains_key(model_kind) {
                return Err(CoreError::RegistryRule("unsupported_model_kind"));
            }
        }
        let bounded = limit.max(1);
        let events = self.store.list_events(model_kind, bounded).map_err(CoreError::Internal)?;
        let signals = self
            .store
            .list_signals(model_kind, bounded, None)
            .map_err(CoreError::Internal)?;

        let mut entries: Vec<HistoryEntry> = Vec::with_capacity(events.len() + signals.len());
        for event in events {
            entries.push(HistoryEntry {
                kind: "event",
                event_kind: event.event_kind,
                actor_agent_id: event.actor_agent_id,
                payload: Some(event.payload),
                created_at: event.created_at,
                version: None,
                metric: None,
                value: None,
                source: None,
            });
        }
        for signal in signals {
            entries.push(HistoryEntry {
                kind: "signal",
                event_kind: "record_signal".to_owned(),
                actor_agent_id: None,
                payload: None,
                created_at: signal.created_at,
                version: Some(signal.version),
                metric: Some(signal.metric),
                value: Some(signal.value),
                source: signal.source,
            });
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(bounded);

        Ok(HistoryResponse {
            model_kind: model_kind.to_owned(),
            items: entries,
        })
    }

    fn view(&self, model_kind: &str, state: &ModelState) -> CoreResult<ModelStateView> {
        let signals = self
            .store
            .list_signals(model_kind, self.signal_window, None)
            .map_err(CoreError::Internal)?;

        let mut summary: BTreeMap<String, BTreeMap<String, MetricSummary>> = BTreeMap::new();
        for signal in signals {
            let per_version = summary.entry(signal.version).or_default();
            let entry = per_version.entry(signal.metric).or_default();
            let new_count = entry.count + 1;
            entry.avg = (entry.avg * entry.count as f64 + signal.value) / new_count as f64;
            entry.count = new_count;
        }

        Ok(ModelStateView {
            model_kind: model_kind.to_owned(),
            active_version: state.active_version.clone(),
            canary_version: state.canary_version.clone(),
            rollout_percent: state.rollout_percent,
            tenant_allowlist: state.tenant_allowlist.iter().cloned().collect(),
            metadata: state.metadata.clone(),
            signal_summary: summary,
            updated_at: state.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmemory::InMemoryModelRegistryStore;

    fn registry() -> ModelRegistry {
        ModelRegistry::with_default_window(Arc::new(InMemoryModelRegistryStore::new())).expect("init")
    }

    #[test]
    fn defaults_are_seeded_on_first_open() {
        let registry = registry();
        let state = registry.get_state("reranker").expect("state");
        assert_eq!(state.active_version, "reranker-baseline-v1");
        assert!(state.canary_version.is_none());
    }

    #[test]
    fn register_canary_rejects_out_of_range_rollout() {
        let registry = registry();
        let err = registry
            .register_canary("reranker", "v2", 150, None, None, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::RegistryRule("rollout_percent_out_of_range")));
    }

    #[test]
    fn promote_without_canary_is_rejected() {
        let registry = registry();
        let err = registry.promote_canary("reranker", None).unwrap_err();
        assert!(matches!(err, CoreError::RegistryRule("canary_not_set")));
    }

    #[test]
    fn promote_canary_clears_canary_and_rollout() {
        let registry = registry();
        registry
            .register_canary("reranker", "v2", 50, None, None, None)
            .expect("register");
        let promoted = registry.promote_canary("reranker", None).expect("promote");
        assert_eq!(promoted.active_version, "v2");
        assert!(promoted.canary_version.is_none());
        assert_eq!(promoted.rollout_percent, 0);

        for tenant in ["tenant-a", "tenant-b", "tenant-c"] {
            let selection = registry.select_version("reranker", tenant).expect("select");
            assert_eq!(selection.version, "v2");
            assert_eq!(selection.route, "active");
        }
    }

    #[test]
    fn rollback_without_canary_is_a_no_op() {
        let registry = registry();
        let state = registry.rollback_canary("reranker", None).expect("rollback");
        assert_eq!(state.active_version, "reranker-baseline-v1");
    }

    #[test]
    fn allowlisted_tenant_always_gets_canary() {
        let registry = registry();
        registry
            .register_canary("reranker", "v2", 0, Some(vec!["tenant-a".into()]), None, None)
            .expect("register");
        let selection = registry.select_version("reranker", "tenant-a").expect("select");
        assert_eq!(selection.version, "v2");
        assert_eq!(selection.route, "canary_allowlist");
    }

    #[test]
    fn no_canary_always_routes_active() {
        let registry = registry();
        let selection = registry.select_version("reranker", "tenant-z").expect("select");
        assert_eq!(selection.version, "reranker-baseline-v1");
        assert_eq!(selection.route, "active");
    }

    #[test]
    fn full_rollout_always_selects_canary() {
        let registry = registry();
        registry
            .register_canary("reranker", "v2", 100, None, None, None)
            .expect("register");
        for tenant in ["tenant-a", "tenant-b", "tenant-c"] {
            let selection = registry.select_version("reranker", tenant).expect("select");
            assert_eq!(selection.route, "canary_percent");
        }
    }

    #[test]
    fn stable_bucket_assignment_is_deterministic_across_calls() {
        let registry = registry();
        registry
            .register_canary("reranker", "v2", 40, None, None, None)
            .expect("register");
        let first = registry.select_version("reranker", "tenant-a").expect("select");
        let second = registry.select_version("reranker", "tenant-a").expect("select");
        assert_eq!(first.route, second.route);
    }

    #[test]
    fn rollout_percent_converges_over_tenant_sample() {
        let registry = registry();
        registry
            .register_canary("reranker", "v2", 30, None, None, None)
            .expect("register");
        let sample_size = 5_000;
        let canary_count = (0..sample_size)
            .filter(|i| {
                let tenant = format!("tenant-{i}");
                registry.select_version("reranker", &tenant).expect("select").route == "canary_percent"
            })
            .count();
        let observed_percent = canary_count as f64 / sample_size as f64 * 100.0;
        assert!((observed_percent - 30.0).abs() < 2.0, "observed {observed_percent}% vs target 30%");
    }

    #[test]
    fn signal_summary_tracks_running_average() {
        let registry = registry();
        registry
            .record_signal("reranker", "reranker-baseline-v1", "latency_ms", 100.0, None, None)
            .expect("signal");
        let state = registry
            .record_signal("reranker", "reranker-baseline-v1", "latency_ms", 200.0, None, None)
            .expect("signal");
        let metric = &state.signal_summary["reranker-baseline-v1"]["latency_ms"];
        assert_eq!(metric.count, 2);
        assert!((metric.avg - 150.0).abs() < 1e-9);
    }

    #[test]
    fn unsupported_model_kind_is_a_registry_rule() {
        let registry = registry();
        let err = registry.get_state("unknown").unwrap_err();
        assert!(matches!(err, CoreError::RegistryRule("unsupported_model_kind")));
    }
}

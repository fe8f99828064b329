use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;

use crate::traits::ModelRegistryStore;
use crate::types::{ModelState, RegistryEvent, SignalRecord};

#[derive(Debug, Default)]
struct State {
    states: HashMap<String, ModelState>,
    signals: HashMap<String, Vec<SignalRecord>>,
    events: HashMap<String, Vec<RegistryEvent>>,
}

#[derive(Debug, Default)]
pub struct InMemoryModelRegistryStore {
    state: RwLock<State>,
}

impl InMemoryModelRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelRegistryStore for InMemoryModelRegistryStore {
    fn load_states(&self) -> Result<Vec<(String, ModelState)>> {
        let state = self.state.read().expect("registry lock poisoned");
        Ok(state
            .states
            .iter()
            .map(|(kind, model)| (kind.clone(), model.clone()))
            .collect())
    }

    fn upsert_state(&self, model_kind: &str, model: &ModelState) -> Result<()> {
        let mut state = self.state.write().expect("registry lock poisoned");
        state.states.insert(model_kind.to_owned(), model.clone());
        Ok(())
    }

    fn insert_signal(&self, model_kind: &str, signal: &SignalRecord) -> Result<()> {
        let mut state = self.state.write().expect("registry lock poisoned");
        state
            .signals
            .entry(model_kind.to_owned())
            .or_default()
            .push(signal.clone());
        Ok(())
    }

    fn list_signals(
        &self,
        model_kind: &str,
        limit: usize,
        version: Option<&str>,
    ) -> Result<Vec<SignalRecord>> {
        let state = self.state.read().expect("registry lock poisoned");
        let mut signals: Vec<SignalRecord> = state
            .signals
            .get(model_kind)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|signal| version.map(|v| signal.version == v).unwrap_or(true))
            .collect();
        signals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        signals.truncate(limit.max(1));
        Ok(signals)
    }

    fn append_event(&self, model_kind: &str, event: &RegistryEvent) -> Result<()> {
        let mut state = self.state.write().expect("registry lock poisoned");
        state
            .events
            .entry(model_kind.to_owned())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn list_events(&self, model_kind: &str, limit: usize) -> Result<Vec<RegistryEvent>> {
        let state = self.state.read().expect("registry lock poisoned");
        let mut events = state.events.get(model_kind).cloned().unwrap_or_default();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit.max(1));
        Ok(events)
    }
}

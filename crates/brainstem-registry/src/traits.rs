use anyhow::Result;

use crate::types::{ModelState, RegistryEvent, SignalRecord};

/// Persistence backend for model registry state. In-memory and SQL
/// implementations must behave identically under the shared behavioral
/// test suite.
pub trait ModelRegistryStore: Send + Sync {
    fn load_states(&self) -> Result<Vec<(String, ModelState)>>;

    fn upsert_state(&self, model_kind: &str, state: &ModelState) -> Result<()>;

    fn insert_signal(&self, model_kind: &str, signal: &SignalRecord) -> Result<()>;

    fn list_signals(
        &self,
        model_kind: &str,
        limit: usize,
        version: Option<&str>,
    ) -> Result<Vec<SignalRecord>>;

    fn append_event(&self, model_kind: &str, event: &RegistryEvent) -> Result<()>;

    fn list_events(&self, model_kind: &str, limit: usize) -> Result<Vec<RegistryEvent>>;
}

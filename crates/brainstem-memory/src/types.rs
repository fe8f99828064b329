use brainstem_core::{MemoryType, Scope, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The primary entity. Identity/classification/scope/trust are immutable
/// once created; `tombstoned` is monotonic false→true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub trust_level: TrustLevel,
    pub text: String,
    pub source_ref: Option<String>,
    pub confidence: f64,
    pub salience: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tombstoned: bool,
}

/// A single item inside a `remember` call, before ids/timestamps are assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemoryItem {
    pub memory_type: MemoryType,
    pub trust_level: TrustLevel,
    pub text: String,
    pub source_ref: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub salience: Option<f64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RememberRequest {
    pub tenant_id: String,
    pub agent_id: String,
    pub scope: Scope,
    pub items: Vec<NewMemoryItem>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub memory_ids: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecallBudget {
    pub max_items: usize,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecallFilters {
    #[serde(default)]
    pub trust_min: f64,
    #[serde(default)]
    pub types: Option<Vec<MemoryType>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecallRequest {
    pub tenant_id: String,
    pub agent_id: String,
    pub query: String,
    pub scope: Scope,
    pub budget: RecallBudget,
    #[serde(default)]
    pub filters: RecallFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub memory_id: String,
    pub text: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub trust_level: TrustLevel,
    pub confidence: f64,
    pub salience: f64,
    pub score: f64,
    pub token_estimate: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResponse {
    pub items: Vec<MemorySnippet>,
    pub composed_tokens_estimate: usize,
    pub conflicts: Vec<String>,
    pub trace_id: String,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub model_route: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDetails {
    pub memory_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub trust_level: TrustLevel,
    pub text: String,
    pub source_ref: Option<String>,
    pub confidence: f64,
    pub salience: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tombstoned: bool,
}

impl From<&MemoryRecord> for MemoryDetails {
    fn from(record: &MemoryRecord) -> Self {
        Self {
            memory_id: record.memory_id.clone(),
            tenant_id: record.tenant_id.clone(),
            agent_id: record.agent_id.clone(),
            memory_type: record.memory_type,
            scope: record.scope,
            trust_level: record.trust_level,
            text: record.text.clone(),
            source_ref: record.source_ref.clone(),
            confidence: record.confidence,
            salience: record.salience,
            created_at: record.created_at,
            expires_at: record.expires_at,
            tombstoned: record.tombstoned,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForgetResponse {
    pub deleted: bool,
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ModelState {
    pub active_version: String,
    pub canary_version: Option<String>,
    pub rollout_percent: u8,
    pub tenant_allowlist: BTreeSet<String>,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl ModelState {
    pub fn baseline(model_kind: &str) -> Self {
        Self {
            active_version: format!("{model_kind}-baseline-v1"),
            canary_version: None,
            rollout_percent: 0,
            tenant_allowlist: BTreeSet::new(),
            metadata: serde_json::Value::Null,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub version: String,
    pub metric: String,
    pub value: f64,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub event_kind: String,
    pub actor_agent_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Route a recall/reflect caller was actually served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Active,
    CanaryAllowlist,
    CanaryPercent,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Active => "active",
            Route::CanaryAllowlist => "canary_allowlist",
            Route::CanaryPercent => "canary_percent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSelection {
    pub version: String,
    pub route: String,
}

/// Running mean/count pair per metric, avoiding a full signal replay on
/// every read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStateView {
    pub model_kind: String,
    pub active_version: String,
    pub canary_version: Option<String>,
    pub rollout_percent: u8,
    pub tenant_allowlist: Vec<String>,
    pub metadata: serde_json::Value,
    pub signal_summary: BTreeMap<String, BTreeMap<String, MetricSummary>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: &'static str,
    pub event_kind: String,
    pub actor_agent_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub version: Option<String>,
    pub metric: Option<String>,
    pub value: Option<f64>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub model_kind: String,
    pub items: Vec<HistoryEntry>,
}

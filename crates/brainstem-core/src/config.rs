use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Shared config handle. Readers call `.load()` for a lock-free snapshot.
pub type SharedConfig = Arc<ArcSwap<Config>>;

/// Wrap a `Config` in an `ArcSwap` for lock-free sharing across worker loops.
pub fn shared_config(config: Config) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub model_registry: ModelRegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            jobs: JobConfig::default(),
            graph: GraphConfig::default(),
            model_registry: ModelRegistryConfig::default(),
        }
    }
}

impl Config {
    /// Loads config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolves a config path: explicit arg, then `./brainstem.toml`, then
    /// `$XDG_CONFIG_HOME/brainstem/brainstem.toml`, then
    /// `~/.config/brainstem/brainstem.toml`, falling back to the local name.
    pub fn find_config_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }

        let local = PathBuf::from("brainstem.toml");
        if local.exists() {
            return local;
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            let xdg = PathBuf::from(config_dir).join("brainstem/brainstem.toml");
            if xdg.exists() {
                return xdg;
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home).join(".config/brainstem/brainstem.toml");
            if home_config.exists() {
                return home_config;
            }
        }

        local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Inmemory,
    Sqlite,
    Postgres,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Inmemory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobBackend {
    Inprocess,
    Sqlite,
}

impl Default for JobBackend {
    fn default() -> Self {
        JobBackend::Inprocess
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Path to the SQLite database file; used when `backend = sqlite`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Postgres connection string; used when `backend = postgres`.
    #[serde(default)]
    pub postgres_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
            postgres_url: None,
        }
    }
}

fn default_sqlite_path() -> String {
    "brainstem-memory.sqlite3".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub backend: JobBackend,
    #[serde(default = "default_sqlite_jobs_path")]
    pub sqlite_path: String,
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            backend: JobBackend::default(),
            sqlite_path: default_sqlite_jobs_path(),
            default_max_attempts: default_max_attempts(),
            poll_interval_s: default_poll_interval_s(),
        }
    }
}

fn default_sqlite_jobs_path() -> String {
    "brainstem-jobs.sqlite3".to_owned()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_s() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_expansion")]
    pub max_expansion: usize,
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,
    #[serde(default = "default_relation_weights")]
    pub relation_weights: HashMap<String, f64>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: default_graph_enabled(),
            max_expansion: default_max_expansion(),
            half_life_hours: default_half_life_hours(),
            relation_weights: default_relation_weights(),
        }
    }
}

fn default_graph_enabled() -> bool {
    true
}

fn default_max_expansion() -> usize {
    4
}

fn default_half_life_hours() -> f64 {
    168.0
}

fn default_relation_weights() -> HashMap<String, f64> {
    [
        ("keyword".to_owned(), 1.0),
        ("phrase".to_owned(), 1.4),
        ("temporal".to_owned(), 1.2),
        ("reference".to_owned(), 1.6),
    ]
    .into_iter()
    .collect()
}

/// Validates overridden relation weights against the fixed relation key set,
/// clamping negative values to zero.
pub fn validate_relation_weights(
    overrides: &HashMap<String, f64>,
) -> Result<HashMap<String, f64>, String> {
    let mut weights = default_relation_weights();
    for (key, value) in overrides {
        if !weights.contains_key(key) {
            return Err(format!("unknown relation weight key: {key}"));
        }
        weights.insert(key.clone(), value.max(0.0));
    }
    Ok(weights)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRegistryConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_registry_path")]
    pub sqlite_path: String,
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_signal_window")]
    pub signal_window: usize,
}

impl Default for ModelRegistryConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_registry_path(),
            postgres_url: None,
            signal_window: default_signal_window(),
        }
    }
}

fn default_sqlite_registry_path() -> String {
    "brainstem-registry.sqlite3".to_owned()
}

fn default_signal_window() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(config, parsed);
    }

    #[test]
    fn relation_weight_override_rejects_unknown_key() {
        let mut overrides = HashMap::new();
        overrides.insert("unknown".to_owned(), 2.0);
        assert!(validate_relation_weights(&overrides).is_err());
    }

    #[test]
    fn relation_weight_override_clamps_negative() {
        let mut overrides = HashMap::new();
        overrides.insert("keyword".to_owned(), -5.0);
        let weights = validate_relation_weights(&overrides).expect("valid");
        assert_eq!(weights["keyword"], 0.0);
    }
}

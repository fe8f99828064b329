use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Keyword,
    Phrase,
    Temporal,
    Reference,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Keyword => "keyword",
            Relation::Phrase => "phrase",
            Relation::Temporal => "temporal",
            Relation::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keyword" => Some(Relation::Keyword),
            "phrase" => Some(Relation::Phrase),
            "temporal" => Some(Relation::Temporal),
            "reference" => Some(Relation::Reference),
            _ => None,
        }
    }

    pub const ALL: [Relation; 4] = [
        Relation::Keyword,
        Relation::Phrase,
        Relation::Temporal,
        Relation::Reference,
    ];
}

/// Fixed per-relation weights, overridable via config (validated in
/// `brainstem_core::config::validate_relation_weights`).
pub fn default_relation_weight(relation: Relation) -> f64 {
    match relation {
        Relation::Keyword => 1.0,
        Relation::Phrase => 1.4,
        Relation::Temporal => 1.2,
        Relation::Reference => 1.6,
    }
}

pub fn relation_weight(relation: Relation, overrides: &HashMap<String, f64>) -> f64 {
    overrides
        .get(relation.as_str())
        .copied()
        .unwrap_or_else(|| default_relation_weight(relation))
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub tenant_id: String,
    pub src: String,
    pub dst: String,
    pub relation: Relation,
    pub weight: f64,
    pub updated_at: DateTime<Utc>,
}

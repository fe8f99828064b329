use serde::{Deserialize, Serialize};

/// Visibility class of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Private,
    Team,
    Global,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Private => "private",
            Scope::Team => "team",
            Scope::Global => "global",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Scope::Private),
            "team" => Some(Scope::Team),
            "global" => Some(Scope::Global),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance class of a memory, mapped to a fixed trust weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    TrustedTool,
    UserClaim,
    UntrustedWeb,
}

impl TrustLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::TrustedTool => "trusted_tool",
            TrustLevel::UserClaim => "user_claim",
            TrustLevel::UntrustedWeb => "untrusted_web",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "trusted_tool" => Some(TrustLevel::TrustedTool),
            "user_claim" => Some(TrustLevel::UserClaim),
            "untrusted_web" => Some(TrustLevel::UntrustedWeb),
            _ => None,
        }
    }

    /// Fixed trust weight used in recall scoring.
    pub fn trust_score(self) -> f64 {
        match self {
            TrustLevel::TrustedTool => 1.0,
            TrustLevel::UserClaim => 0.7,
            TrustLevel::UntrustedWeb => 0.35,
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a memory's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Event,
    Fact,
    Episode,
    Policy,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Event => "event",
            MemoryType::Fact => "fact",
            MemoryType::Episode => "episode",
            MemoryType::Policy => "policy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(MemoryType::Event),
            "fact" => Some(MemoryType::Fact),
            "episode" => Some(MemoryType::Episode),
            "policy" => Some(MemoryType::Policy),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use thiserror::Error;

/// Synchronously surfaced error taxonomy. `conflict_signal` and
/// `idempotency_replay` are intentionally absent — they are soft signals
/// carried in response payloads, never errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not_found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("registry_rule: {0}")]
    RegistryRule(&'static str),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

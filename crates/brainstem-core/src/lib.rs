pub mod config;
pub mod error;
pub mod ids;
pub mod scoring;
pub mod types;

pub use config::{Config, GraphConfig, JobBackend, JobConfig, ModelRegistryConfig, SharedConfig, StoreBackend, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use types::{MemoryType, Scope, TrustLevel};

mod inmemory;
#[cfg(feature = "postgres")]
mod postgres;
mod registry;
mod sqlite;
mod traits;
mod types;

pub use inmemory::InMemoryModelRegistryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresModelRegistryStore;
pub use registry::ModelRegistry;
pub use sqlite::SqliteModelRegistryStore;
pub use traits::ModelRegistryStore;
pub use types::{
    HistoryEntry, HistoryResponse, MetricSummary, ModelState, ModelStateView, RegistryEvent,
    Route, SignalRecord, VersionSelection,
};

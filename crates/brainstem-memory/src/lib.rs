pub mod embedding;
pub mod inmemory;
pub mod recall;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use inmemory::InMemoryRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;
pub use sqlite::SqliteRepository;
pub use traits::MemoryRepository;
pub use types::*;

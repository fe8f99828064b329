mod inprocess;
mod manager;
mod sqlite;
mod traits;
mod types;

pub use inprocess::InProcessJobQueue;
pub use manager::JobManager;
pub use sqlite::SqliteJobQueue;
pub use traits::JobQueue;
pub use types::{CleanupPayload, JobKind, JobRecord, JobStatus, ReflectPayload, TrainPayload};

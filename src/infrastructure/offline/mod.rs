mod mappers;
pub mod metrics;
mod queries;
mod rows;
pub mod sqlite_edit_store;
pub mod sqlite_file_store;

pub use metrics::{SyncAttemptMetadata, SyncMetrics, SyncMetricsSnapshot, SyncOutcome};
pub use sqlite_edit_store::SqliteEditStore;
pub use sqlite_file_store::SqliteFileStore;

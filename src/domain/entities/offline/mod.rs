pub mod conflict;
pub mod download_progress;
pub mod offline_edit;
pub mod offline_file;
pub mod queue_status;
pub mod storage;

pub use conflict::{ConflictResolution, FileConflict};
pub use download_progress::DownloadProgress;
pub use offline_edit::{EditCounts, OfflineEdit, OfflineEditDraft};
pub use offline_file::{sanitize_file_name, FileItem, FileKind, OfflineFile, OfflineFileInfo};
pub use queue_status::{SyncReport, WorkQueueStatus};
pub use storage::{
    format_file_size, CategoryUsage, CleanupReport, OfflineStorageStats, StorageCategory,
    StorageValidation,
};

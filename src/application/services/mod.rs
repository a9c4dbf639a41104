pub mod events;
pub mod in_flight;
pub mod offline_editing_service;
pub mod offline_file_cache;
pub mod offline_manager;
pub mod sync_service;

pub use events::OfflineEvents;
pub use in_flight::{InFlightGuard, InFlightSet};
pub use offline_editing_service::OfflineEditingService;
pub use offline_file_cache::{CacheLimits, OfflineFileCache};
pub use offline_manager::{BatchDownloadReport, DownloadOptions, OfflineManager};
pub use sync_service::{SyncPolicy, SyncService};

pub mod ports;
pub mod services;

pub use services::{OfflineEditingService, OfflineFileCache, OfflineManager, SyncService};

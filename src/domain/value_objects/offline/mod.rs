pub mod cell_ref;
pub mod download_status;
pub mod edit_id;
pub mod edit_type;
pub mod file_id;
pub mod file_type;
pub mod network;
pub mod payload;
pub mod sync_status;
pub mod sync_trigger;

pub use cell_ref::CellRef;
pub use download_status::DownloadStatus;
pub use edit_id::EditId;
pub use edit_type::EditType;
pub use file_id::FileId;
pub use file_type::FileType;
pub use network::{NetworkKind, NetworkState};
pub use payload::EditPayload;
pub use sync_status::{EditSyncStatus, FileSyncStatus};
pub use sync_trigger::SyncTrigger;

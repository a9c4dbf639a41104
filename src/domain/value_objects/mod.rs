pub mod offline;

pub use offline::{
    CellRef, DownloadStatus, EditId, EditPayload, EditSyncStatus, EditType, FileId,
    FileSyncStatus, FileType, NetworkKind, NetworkState, SyncTrigger,
};

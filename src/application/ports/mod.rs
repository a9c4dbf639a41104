pub mod blob_storage;
pub mod edit_store;
pub mod file_store;
pub mod network;
pub mod remote;

pub use blob_storage::{BlobStorage, StoredBlob};
pub use edit_store::{LocalEditStore, WorkingCopyStore};
pub use file_store::{CacheUsage, OfflineFileStore};
pub use network::NetworkMonitor;
pub use remote::{ProgressCallback, RemoteAck, RemoteDocumentApi, RemoteError, RemoteFileSource};

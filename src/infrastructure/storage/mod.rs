pub mod fs_blob_storage;

pub use fs_blob_storage::FsBlobStorage;

use crate::application::ports::blob_storage::{BlobStorage, StoredBlob};
use crate::shared::error::AppError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// `<root>/blobs/<先頭2文字>/<sha256>` に保存するファイルシステム実装。
///
/// 書き込みは `<root>/tmp` に出力してから rename するため、途中で中断されても
/// 最終パスに不完全なファイルは残らない。
pub struct FsBlobStorage {
    root_dir: PathBuf,
    blobs_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl FsBlobStorage {
    pub async fn new(root_dir: PathBuf) -> Result<Self, AppError> {
        let blobs_dir = root_dir.join("blobs");
        let tmp_dir = root_dir.join("tmp");
        fs::create_dir_all(&blobs_dir)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to create blobs dir: {err}")))?;

        // 前回中断した書き込みの残骸を捨てる
        if fs::metadata(&tmp_dir).await.is_ok() {
            fs::remove_dir_all(&tmp_dir).await.map_err(|err| {
                AppError::Storage(format!("Failed to clear temporary blob dir: {err}"))
            })?;
        }
        fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to create tmp dir: {err}")))?;

        Ok(Self {
            root_dir,
            blobs_dir,
            tmp_dir,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    async fn write_atomically(&self, data: &[u8], target: &Path) -> Result<(), AppError> {
        let tmp_path = self
            .tmp_dir
            .join(format!("{}.part", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&tmp_path, target).await
        }
        .await;

        if let Err(err) = result {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        target: "offline::cache",
                        path = %tmp_path.display(),
                        error = %cleanup,
                        "Failed to remove partial blob"
                    );
                }
            }
            return Err(AppError::Storage(format!("Failed to write blob: {err}")));
        }
        Ok(())
    }
}

pub fn compute_blob_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn validate_hash(hash: &str) -> Result<(), AppError> {
    if hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("Invalid blob hash: {hash}")))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn put(&self, data: &[u8]) -> Result<StoredBlob, AppError> {
        let hash = compute_blob_hash(data);
        let path = self.path_for(&hash);

        if fs::metadata(&path).await.is_ok() {
            debug!(target: "offline::cache", blob_hash = %hash, "Blob already stored");
        } else {
            self.write_atomically(data, &path).await?;
        }

        Ok(StoredBlob {
            hash,
            path,
            size: data.len() as u64,
        })
    }

    async fn read(&self, hash: &str) -> Result<Option<Vec<u8>>, AppError> {
        validate_hash(hash)?;
        match fs::read(self.path_for(hash)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Storage(format!("Failed to read blob: {err}"))),
        }
    }

    async fn exists(&self, hash: &str) -> Result<bool, AppError> {
        validate_hash(hash)?;
        Ok(fs::metadata(self.path_for(hash)).await.is_ok())
    }

    async fn delete(&self, hash: &str) -> Result<bool, AppError> {
        validate_hash(hash)?;
        match fs::remove_file(self.path_for(hash)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AppError::Storage(format!("Failed to delete blob: {err}"))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut hashes = Vec::new();
        let mut shards = fs::read_dir(&self.blobs_dir).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if let Some(name) = entry.file_name().to_str() {
                    if validate_hash(name).is_ok() {
                        hashes.push(name.to_string());
                    }
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        let shard = hash.get(..2).unwrap_or("00");
        self.blobs_dir.join(shard).join(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (FsBlobStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf()).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn put_is_content_addressed() {
        let (storage, _dir) = setup().await;
        let first = storage.put(b"hello").await.unwrap();
        let second = storage.put(b"hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(first.size, 5);
        assert!(first.path.starts_with(storage.root_dir()));
        assert_eq!(
            storage.read(&first.hash).await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );
        assert_eq!(storage.list().await.unwrap(), vec![first.hash]);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob() {
        let (storage, _dir) = setup().await;
        let blob = storage.put(b"bytes").await.unwrap();

        assert!(storage.delete(&blob.hash).await.unwrap());
        assert!(!storage.delete(&blob.hash).await.unwrap());
        assert!(!storage.exists(&blob.hash).await.unwrap());
        assert!(storage.read(&blob.hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_path_like_hashes() {
        let (storage, _dir) = setup().await;
        assert!(matches!(
            storage.read("../../etc/passwd").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn leftover_partial_writes_are_discarded_on_open() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("tmp");
        std::fs::create_dir_all(&tmp).unwrap();
        std::fs::write(tmp.join("stale.part"), b"half").unwrap();

        let storage = FsBlobStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert!(!tmp.join("stale.part").exists());
        assert!(storage.list().await.unwrap().is_empty());
    }
}

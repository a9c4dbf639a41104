use crate::shared::error::AppError;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub hash: String,
    pub path: PathBuf,
    pub size: u64,
}

/// 内容アドレス（SHA-256）でバイト列を保存するストレージ
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// 全体を書き終えてから公開する（部分書き込みを残さない）
    async fn put(&self, data: &[u8]) -> Result<StoredBlob, AppError>;

    async fn read(&self, hash: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn exists(&self, hash: &str) -> Result<bool, AppError>;

    /// 既に存在しない場合は `false`（エラーにしない）
    async fn delete(&self, hash: &str) -> Result<bool, AppError>;

    async fn list(&self) -> Result<Vec<String>, AppError>;

    fn path_for(&self, hash: &str) -> PathBuf;
}

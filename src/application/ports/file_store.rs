use crate::domain::entities::offline::OfflineFile;
use crate::domain::value_objects::offline::{FileId, FileSyncStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// キャッシュ全体の使用量集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub used_bytes: u64,
    pub file_count: u64,
    pub oldest_download: Option<DateTime<Utc>>,
    pub newest_download: Option<DateTime<Utc>>,
}

/// キャッシュ済みファイルのメタデータ永続化ポート
#[async_trait]
pub trait OfflineFileStore: Send + Sync {
    async fn upsert(&self, file: &OfflineFile) -> Result<(), AppError>;

    async fn get(&self, file_id: &FileId) -> Result<Option<OfflineFile>, AppError>;

    async fn list(&self) -> Result<Vec<OfflineFile>, AppError>;

    async fn list_by_status(&self, status: &FileSyncStatus)
        -> Result<Vec<OfflineFile>, AppError>;

    /// 最終アクセス日時を更新。対象が無ければ `false`。
    async fn touch(&self, file_id: &FileId, at: DateTime<Utc>) -> Result<bool, AppError>;

    async fn update_sync_status(
        &self,
        file_id: &FileId,
        status: &FileSyncStatus,
    ) -> Result<bool, AppError>;

    /// 現在の状態が `from` のときだけ `to` へ移す。移した場合 `true`。
    async fn replace_sync_status(
        &self,
        file_id: &FileId,
        from: &FileSyncStatus,
        to: &FileSyncStatus,
    ) -> Result<bool, AppError>;

    async fn update_remote_version(
        &self,
        file_id: &FileId,
        version: Option<i64>,
    ) -> Result<bool, AppError>;

    /// 削除したレコードを返す
    async fn delete(&self, file_id: &FileId) -> Result<Option<OfflineFile>, AppError>;

    async fn delete_all(&self) -> Result<Vec<OfflineFile>, AppError>;

    /// 退避候補（`synced` のみ、最終アクセスが古い順）
    async fn eviction_candidates(&self) -> Result<Vec<OfflineFile>, AppError>;

    /// 同じ内容ハッシュを参照しているレコード数
    async fn count_by_hash(&self, blob_hash: &str) -> Result<u64, AppError>;

    async fn referenced_hashes(&self) -> Result<HashSet<String>, AppError>;

    async fn usage(&self) -> Result<CacheUsage, AppError>;
}

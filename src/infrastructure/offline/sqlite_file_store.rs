use super::mappers::{cache_usage_from_row, offline_file_from_row, size_to_db};
use super::queries::{
    COUNT_FILES_BY_HASH, DELETE_ALL_FILES, DELETE_FILE, SELECT_EVICTION_CANDIDATES,
    SELECT_FILES, SELECT_FILES_BY_STATUS, SELECT_FILE_BY_ID, SELECT_FILE_HASHES,
    REPLACE_FILE_SYNC_STATUS, SELECT_FILE_USAGE, UPDATE_FILE_ACCESSED, UPDATE_FILE_REMOTE_VERSION,
    UPDATE_FILE_SYNC_STATUS, UPSERT_FILE,
};
use super::rows::{FileUsageRow, OfflineFileRow};
use crate::application::ports::file_store::{CacheUsage, OfflineFileStore};
use crate::domain::entities::offline::OfflineFile;
use crate::domain::value_objects::offline::{FileId, FileSyncStatus};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Clone)]
pub struct SqliteFileStore {
    pool: ConnectionPool,
}

impl SqliteFileStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    async fn fetch_files(
        &self,
        query: &'static str,
        bind: Option<&str>,
    ) -> Result<Vec<OfflineFile>, AppError> {
        let mut builder = sqlx::query_as::<_, OfflineFileRow>(query);
        if let Some(value) = bind {
            builder = builder.bind(value);
        }
        let rows = builder.fetch_all(self.pool.get_pool()).await?;
        rows.into_iter().map(offline_file_from_row).collect()
    }
}

#[async_trait]
impl OfflineFileStore for SqliteFileStore {
    async fn upsert(&self, file: &OfflineFile) -> Result<(), AppError> {
        sqlx::query(UPSERT_FILE)
            .bind(file.file_id.as_str())
            .bind(file.local_path.to_string_lossy().into_owned())
            .bind(&file.blob_hash)
            .bind(&file.original_name)
            .bind(size_to_db(file.size))
            .bind(&file.mime_type)
            .bind(file.sync_status.as_str())
            .bind(file.remote_version)
            .bind(file.is_starred)
            .bind(&file.parent_id)
            .bind(file.last_modified.map(|ts| ts.timestamp_millis()))
            .bind(file.downloaded_at.timestamp_millis())
            .bind(file.accessed_at.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn get(&self, file_id: &FileId) -> Result<Option<OfflineFile>, AppError> {
        let row = sqlx::query_as::<_, OfflineFileRow>(SELECT_FILE_BY_ID)
            .bind(file_id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        row.map(offline_file_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<OfflineFile>, AppError> {
        self.fetch_files(SELECT_FILES, None).await
    }

    async fn list_by_status(
        &self,
        status: &FileSyncStatus,
    ) -> Result<Vec<OfflineFile>, AppError> {
        self.fetch_files(SELECT_FILES_BY_STATUS, Some(status.as_str()))
            .await
    }

    async fn touch(&self, file_id: &FileId, at: DateTime<Utc>) -> Result<bool, AppError> {
        let affected = sqlx::query(UPDATE_FILE_ACCESSED)
            .bind(file_id.as_str())
            .bind(at.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn update_sync_status(
        &self,
        file_id: &FileId,
        status: &FileSyncStatus,
    ) -> Result<bool, AppError> {
        let affected = sqlx::query(UPDATE_FILE_SYNC_STATUS)
            .bind(file_id.as_str())
            .bind(status.as_str())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn replace_sync_status(
        &self,
        file_id: &FileId,
        from: &FileSyncStatus,
        to: &FileSyncStatus,
    ) -> Result<bool, AppError> {
        let affected = sqlx::query(REPLACE_FILE_SYNC_STATUS)
            .bind(file_id.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn update_remote_version(
        &self,
        file_id: &FileId,
        version: Option<i64>,
    ) -> Result<bool, AppError> {
        let affected = sqlx::query(UPDATE_FILE_REMOTE_VERSION)
            .bind(file_id.as_str())
            .bind(version)
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn delete(&self, file_id: &FileId) -> Result<Option<OfflineFile>, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        let row = sqlx::query_as::<_, OfflineFileRow>(SELECT_FILE_BY_ID)
            .bind(file_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if row.is_some() {
            sqlx::query(DELETE_FILE)
                .bind(file_id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        row.map(offline_file_from_row).transpose()
    }

    async fn delete_all(&self) -> Result<Vec<OfflineFile>, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        let rows = sqlx::query_as::<_, OfflineFileRow>(SELECT_FILES)
            .fetch_all(&mut *tx)
            .await?;
        sqlx::query(DELETE_ALL_FILES).execute(&mut *tx).await?;
        tx.commit().await?;
        rows.into_iter().map(offline_file_from_row).collect()
    }

    async fn eviction_candidates(&self) -> Result<Vec<OfflineFile>, AppError> {
        self.fetch_files(SELECT_EVICTION_CANDIDATES, None).await
    }

    async fn count_by_hash(&self, blob_hash: &str) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(COUNT_FILES_BY_HASH)
            .bind(blob_hash)
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn referenced_hashes(&self) -> Result<HashSet<String>, AppError> {
        let hashes: Vec<String> = sqlx::query_scalar(SELECT_FILE_HASHES)
            .fetch_all(self.pool.get_pool())
            .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn usage(&self) -> Result<CacheUsage, AppError> {
        let row = sqlx::query_as::<_, FileUsageRow>(SELECT_FILE_USAGE)
            .fetch_one(self.pool.get_pool())
            .await?;
        cache_usage_from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    async fn setup_store() -> SqliteFileStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        SqliteFileStore::new(pool)
    }

    fn record(id: &str, size: u64, accessed_minutes_ago: i64, status: FileSyncStatus) -> OfflineFile {
        let now = Utc::now();
        OfflineFile {
            file_id: FileId::new(id.to_string()).unwrap(),
            local_path: PathBuf::from(format!("/cache/{id}")),
            blob_hash: format!("hash-{id}"),
            original_name: format!("{id}.txt"),
            size,
            mime_type: Some("text/plain".into()),
            sync_status: status,
            remote_version: Some(1),
            is_starred: false,
            parent_id: None,
            last_modified: None,
            downloaded_at: now - Duration::minutes(60),
            accessed_at: now - Duration::minutes(accessed_minutes_ago),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let store = setup_store().await;
        let file = record("f1", 1024, 5, FileSyncStatus::Synced);
        store.upsert(&file).await.unwrap();

        let loaded = store.get(&file.file_id).await.unwrap().unwrap();
        assert_eq!(loaded.size, 1024);
        assert_eq!(loaded.local_path, file.local_path);
        assert_eq!(
            loaded.accessed_at.timestamp_millis(),
            file.accessed_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn eviction_candidates_skip_modified_and_order_by_access() {
        let store = setup_store().await;
        store
            .upsert(&record("recent", 10, 1, FileSyncStatus::Synced))
            .await
            .unwrap();
        store
            .upsert(&record("stale", 10, 50, FileSyncStatus::Synced))
            .await
            .unwrap();
        store
            .upsert(&record("edited", 10, 100, FileSyncStatus::Modified))
            .await
            .unwrap();
        store
            .upsert(&record("diverged", 10, 200, FileSyncStatus::Conflict))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .eviction_candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.file_id.to_string())
            .collect();
        assert_eq!(ids, vec!["stale".to_string(), "recent".to_string()]);
    }

    #[tokio::test]
    async fn usage_sums_sizes() {
        let store = setup_store().await;
        assert_eq!(store.usage().await.unwrap(), CacheUsage::default());

        store
            .upsert(&record("a", 100, 1, FileSyncStatus::Synced))
            .await
            .unwrap();
        store
            .upsert(&record("b", 250, 1, FileSyncStatus::Modified))
            .await
            .unwrap();

        let usage = store.usage().await.unwrap();
        assert_eq!(usage.used_bytes, 350);
        assert_eq!(usage.file_count, 2);
        assert!(usage.oldest_download.is_some());
    }

    #[tokio::test]
    async fn delete_returns_removed_record() {
        let store = setup_store().await;
        let file = record("a", 100, 1, FileSyncStatus::Synced);
        store.upsert(&file).await.unwrap();

        assert_eq!(store.count_by_hash("hash-a").await.unwrap(), 1);
        let removed = store.delete(&file.file_id).await.unwrap().unwrap();
        assert_eq!(removed.blob_hash, "hash-a");
        assert!(store.delete(&file.file_id).await.unwrap().is_none());
        assert_eq!(store.count_by_hash("hash-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn status_updates_report_missing_rows() {
        let store = setup_store().await;
        let id = FileId::new("ghost".into()).unwrap();
        assert!(!store
            .update_sync_status(&id, &FileSyncStatus::Modified)
            .await
            .unwrap());
        assert!(!store.touch(&id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn replace_sync_status_only_moves_from_expected_state() {
        let store = setup_store().await;
        let file = record("a", 100, 1, FileSyncStatus::Conflict);
        store.upsert(&file).await.unwrap();

        assert!(!store
            .replace_sync_status(&file.file_id, &FileSyncStatus::Synced, &FileSyncStatus::Modified)
            .await
            .unwrap());
        assert!(store
            .replace_sync_status(&file.file_id, &FileSyncStatus::Conflict, &FileSyncStatus::Modified)
            .await
            .unwrap());

        let loaded = store.get(&file.file_id).await.unwrap().unwrap();
        assert_eq!(loaded.sync_status, FileSyncStatus::Modified);
    }
}

use crate::application::ports::blob_storage::BlobStorage;
use crate::application::ports::file_store::OfflineFileStore;
use crate::application::ports::remote::{ProgressCallback, RemoteFileSource};
use crate::application::services::events::OfflineEvents;
use crate::application::services::in_flight::InFlightSet;
use crate::domain::entities::offline::{
    format_file_size, sanitize_file_name, CategoryUsage, CleanupReport, FileItem, OfflineFile,
    OfflineStorageStats, StorageCategory,
};
use crate::domain::value_objects::offline::{FileId, FileSyncStatus};
use crate::shared::config::StorageConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use lru::LruCache;
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_storage_size: u64,
    pub max_file_size: u64,
}

impl From<&StorageConfig> for CacheLimits {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_storage_size: config.max_storage_size,
            max_file_size: config.max_file_size,
        }
    }
}

/// リモートファイルのローカルコピーを管理するキャッシュ。
///
/// バイト列は `BlobStorage` に内容アドレスで、メタデータは `OfflineFileStore` に置く。
/// メタデータはブロブの書き込み完了後にだけ作られるため、レコードが存在すれば
/// 対応するバイト列も揃っている。
pub struct OfflineFileCache {
    files: Arc<dyn OfflineFileStore>,
    blobs: Arc<dyn BlobStorage>,
    source: Arc<dyn RemoteFileSource>,
    events: Arc<OfflineEvents>,
    limits: RwLock<CacheLimits>,
    in_flight: InFlightSet,
    // 容量チェックから記録までを直列にする
    commit: Mutex<()>,
    metadata: Mutex<MetadataProjection>,
}

/// 読み取り用の射影。書き込み系の操作では必ず無効化する。
///
/// 無効化のたびに世代を進め、読み込み開始後に世代が変わっていれば
/// 読んだ行は載せない。
struct MetadataProjection {
    entries: LruCache<FileId, OfflineFile>,
    generation: u64,
}

impl MetadataProjection {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            generation: 0,
        }
    }

    fn invalidate(&mut self, file_id: &FileId) {
        self.entries.pop(file_id);
        self.generation = self.generation.wrapping_add(1);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}

impl OfflineFileCache {
    pub fn new(
        files: Arc<dyn OfflineFileStore>,
        blobs: Arc<dyn BlobStorage>,
        source: Arc<dyn RemoteFileSource>,
        events: Arc<OfflineEvents>,
        limits: CacheLimits,
        metadata_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(metadata_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            files,
            blobs,
            source,
            events,
            limits: RwLock::new(limits),
            in_flight: InFlightSet::new(),
            commit: Mutex::new(()),
            metadata: Mutex::new(MetadataProjection::new(capacity)),
        }
    }

    pub async fn limits(&self) -> CacheLimits {
        *self.limits.read().await
    }

    pub async fn update_limits(&self, limits: CacheLimits) {
        *self.limits.write().await = limits;
        self.publish_stats().await;
    }

    /// ファイルを取得して保存する。既にキャッシュ済みなら取得せず返す。
    ///
    /// 同じファイルのダウンロードが進行中なら待たずに失敗する。
    pub async fn download(
        &self,
        item: &FileItem,
        on_progress: ProgressCallback,
    ) -> Result<OfflineFile, AppError> {
        if item.is_folder() {
            return Err(AppError::ValidationError(
                "Folders cannot be downloaded for offline use".to_string(),
            ));
        }

        let _guard = self.in_flight.try_acquire(&item.id).ok_or_else(|| {
            AppError::ValidationError(format!("Download already in progress for {}", item.id))
        })?;

        if let Some(existing) = self.files.get(&item.id).await? {
            if self.blobs.exists(&existing.blob_hash).await? {
                let now = Utc::now();
                self.files.touch(&item.id, now).await?;
                self.invalidate(&item.id).await;
                let mut existing = existing;
                existing.mark_accessed(now);
                on_progress(100);
                debug!(target: "offline::cache", file_id = %item.id, "File already cached");
                return Ok(existing);
            }
            warn!(
                target: "offline::cache",
                file_id = %item.id,
                "Cached metadata has no bytes; downloading again"
            );
            self.files.delete(&item.id).await?;
            self.invalidate(&item.id).await;
        }

        let limits = self.limits().await;
        if let Some(size) = item.size {
            ensure_within_file_limit(size, limits.max_file_size)?;
        }

        on_progress(0);
        let bytes = self
            .source
            .fetch(item, Arc::clone(&on_progress))
            .await
            .map_err(AppError::from)?;
        ensure_within_file_limit(bytes.len() as u64, limits.max_file_size)?;

        let record = {
            let _commit = self.commit.lock().await;
            // 申告サイズが無い、または並行ダウンロードがある場合に備え実サイズで確認する
            let validation = self.stats().await?.validate_download(bytes.len() as u64);
            if !validation.can_download {
                let message = validation
                    .message
                    .unwrap_or_else(|| "Not enough storage space".to_string());
                warn!(
                    target: "offline::cache",
                    file_id = %item.id,
                    size = bytes.len(),
                    "Downloaded file does not fit in offline storage"
                );
                return Err(AppError::ValidationError(message));
            }

            let stored = self.blobs.put(&bytes).await?;
            let record = OfflineFile::downloaded(
                item,
                sanitize_file_name(&item.name),
                stored.path,
                stored.hash,
                stored.size,
                Utc::now(),
            );

            if let Err(err) = self.files.upsert(&record).await {
                self.release_blob(&record.blob_hash).await;
                return Err(err);
            }
            record
        };
        self.invalidate(&item.id).await;

        on_progress(100);
        info!(
            target: "offline::cache",
            file_id = %record.file_id,
            size = record.size,
            "Stored file for offline use"
        );
        self.publish_stats().await;
        Ok(record)
    }

    pub fn is_downloading(&self, file_id: &FileId) -> bool {
        self.in_flight.contains(file_id)
    }

    pub fn downloads_in_flight(&self) -> Vec<FileId> {
        self.in_flight.snapshot()
    }

    pub async fn get(&self, file_id: &FileId) -> Result<Option<OfflineFile>, AppError> {
        let generation = {
            let mut projection = self.metadata.lock().await;
            if let Some(file) = projection.entries.get(file_id) {
                return Ok(Some(file.clone()));
            }
            projection.generation
        };
        let file = self.files.get(file_id).await?;
        if let Some(file) = &file {
            let mut projection = self.metadata.lock().await;
            if projection.generation == generation {
                projection.entries.put(file_id.clone(), file.clone());
            }
        }
        Ok(file)
    }

    /// メタデータとバイト列の両方が揃っているか
    pub async fn is_available(&self, file_id: &FileId) -> Result<bool, AppError> {
        match self.get(file_id).await? {
            Some(file) => self.blobs.exists(&file.blob_hash).await,
            None => Ok(false),
        }
    }

    /// バイト列が失われている場合は `None`
    pub async fn local_path(&self, file_id: &FileId) -> Result<Option<PathBuf>, AppError> {
        let Some(file) = self.get(file_id).await? else {
            return Ok(None);
        };
        if !self.blobs.exists(&file.blob_hash).await? {
            return Ok(None);
        }
        Ok(Some(file.local_path))
    }

    pub async fn read_bytes(&self, file_id: &FileId) -> Result<Option<Vec<u8>>, AppError> {
        let Some(file) = self.get(file_id).await? else {
            return Ok(None);
        };
        self.blobs.read(&file.blob_hash).await
    }

    pub async fn mark_accessed(&self, file_id: &FileId) -> Result<bool, AppError> {
        let touched = self.files.touch(file_id, Utc::now()).await?;
        self.invalidate(file_id).await;
        Ok(touched)
    }

    /// ローカル編集ありにする。衝突中のファイルは衝突のまま。
    ///
    /// 判定は永続側の行で行い、読んだ状態からの条件付き更新にする。
    pub async fn mark_modified(&self, file_id: &FileId) -> Result<bool, AppError> {
        let Some(current) = self.files.get(file_id).await? else {
            return Ok(false);
        };
        match current.sync_status {
            FileSyncStatus::Conflict | FileSyncStatus::Modified => Ok(true),
            status => {
                // 間に衝突が記録されていれば更新されず、衝突が残る
                self.files
                    .replace_sync_status(file_id, &status, &FileSyncStatus::Modified)
                    .await?;
                self.invalidate(file_id).await;
                Ok(true)
            }
        }
    }

    /// 衝突を解消済みにする。ローカル編集は残るため `modified` へ戻す。
    pub async fn clear_conflict(&self, file_id: &FileId) -> Result<bool, AppError> {
        let cleared = self
            .files
            .replace_sync_status(file_id, &FileSyncStatus::Conflict, &FileSyncStatus::Modified)
            .await?;
        self.invalidate(file_id).await;
        Ok(cleared)
    }

    pub async fn mark_conflict(&self, file_id: &FileId) -> Result<bool, AppError> {
        self.set_status(file_id, FileSyncStatus::Conflict).await
    }

    pub async fn mark_synced(&self, file_id: &FileId) -> Result<bool, AppError> {
        self.set_status(file_id, FileSyncStatus::Synced).await
    }

    pub async fn set_remote_version(
        &self,
        file_id: &FileId,
        version: Option<i64>,
    ) -> Result<bool, AppError> {
        let updated = self.files.update_remote_version(file_id, version).await?;
        self.invalidate(file_id).await;
        Ok(updated)
    }

    async fn set_status(&self, file_id: &FileId, status: FileSyncStatus) -> Result<bool, AppError> {
        let updated = self.files.update_sync_status(file_id, &status).await?;
        self.invalidate(file_id).await;
        Ok(updated)
    }

    /// キャッシュから取り除く。バイト列が既に無くても成功する。
    pub async fn remove(&self, file_id: &FileId) -> Result<bool, AppError> {
        Ok(self.remove_entry(file_id).await?.is_some())
    }

    /// レコードが無ければ `None`。ある場合はブロブを実際に削除できたか。
    async fn remove_entry(&self, file_id: &FileId) -> Result<Option<bool>, AppError> {
        let removed = self.files.delete(file_id).await?;
        self.invalidate(file_id).await;
        let Some(file) = removed else {
            return Ok(None);
        };
        let released = self.release_blob(&file.blob_hash).await;
        info!(
            target: "offline::cache",
            file_id = %file_id,
            blob_released = released,
            "Removed offline file"
        );
        self.publish_stats().await;
        Ok(Some(released))
    }

    pub async fn clear_all(&self) -> Result<u64, AppError> {
        let removed = self.files.delete_all().await?;
        self.metadata.lock().await.clear();

        let hashes: HashSet<&str> = removed.iter().map(|file| file.blob_hash.as_str()).collect();
        for hash in hashes {
            self.release_blob(hash).await;
        }
        info!(target: "offline::cache", count = removed.len(), "Cleared offline files");
        self.publish_stats().await;
        Ok(removed.len() as u64)
    }

    /// 最終アクセスの古い順に `target_free_bytes` を満たすまで追い出す。
    ///
    /// 対象は同期済みのファイルだけで、未反映の編集を持つファイルは残す。
    pub async fn cleanup(&self, target_free_bytes: u64) -> Result<CleanupReport, AppError> {
        let mut report = CleanupReport::default();
        if target_free_bytes == 0 {
            return Ok(report);
        }

        for candidate in self.files.eviction_candidates().await? {
            if report.freed_bytes >= target_free_bytes {
                break;
            }
            if !candidate.sync_status.is_evictable() || self.in_flight.contains(&candidate.file_id)
            {
                continue;
            }
            if let Some(released) = self.remove_entry(&candidate.file_id).await? {
                // 他のレコードと共有中のブロブは残るので解放量に数えない
                if released {
                    report.freed_bytes += candidate.size;
                }
                report.evicted.push(candidate.file_id);
            }
        }

        info!(
            target: "offline::cache",
            evicted = report.evicted.len(),
            freed = %format_file_size(report.freed_bytes),
            "Storage cleanup finished"
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<OfflineStorageStats, AppError> {
        let usage = self.files.usage().await?;
        let limits = self.limits().await;
        Ok(OfflineStorageStats::new(
            usage.used_bytes,
            limits.max_storage_size,
            usage.file_count,
            usage.oldest_download,
            usage.newest_download,
        ))
    }

    pub async fn list(&self) -> Result<Vec<OfflineFile>, AppError> {
        self.files.list().await
    }

    pub async fn list_by_status(
        &self,
        status: FileSyncStatus,
    ) -> Result<Vec<OfflineFile>, AppError> {
        self.files.list_by_status(&status).await
    }

    pub async fn usage_by_category(
        &self,
    ) -> Result<BTreeMap<StorageCategory, CategoryUsage>, AppError> {
        let mut usage: BTreeMap<StorageCategory, CategoryUsage> = StorageCategory::ALL
            .iter()
            .map(|category| (*category, CategoryUsage::default()))
            .collect();
        for file in self.files.list().await? {
            let entry = usage
                .entry(StorageCategory::from_mime_type(file.mime_type.as_deref()))
                .or_default();
            entry.size += file.size;
            entry.count += 1;
        }
        Ok(usage)
    }

    /// どのメタデータからも参照されないブロブを削除する（起動時）
    pub async fn sweep_orphans(&self) -> Result<u64, AppError> {
        if !self.in_flight.is_empty() {
            debug!(target: "offline::cache", "Skipping orphan sweep while downloads are running");
            return Ok(0);
        }
        let referenced = self.files.referenced_hashes().await?;
        let mut removed = 0;
        for hash in self.blobs.list().await? {
            if referenced.contains(&hash) {
                continue;
            }
            if self.blobs.delete(&hash).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(target: "offline::cache", removed, "Removed orphaned blobs");
        }
        Ok(removed)
    }

    /// 参照が残っていなければブロブを消す。消せた場合 `true`。
    async fn release_blob(&self, hash: &str) -> bool {
        match self.files.count_by_hash(hash).await {
            Ok(0) => match self.blobs.delete(hash).await {
                Ok(deleted) => deleted,
                Err(err) => {
                    warn!(target: "offline::cache", hash, error = %err, "Failed to delete blob");
                    false
                }
            },
            Ok(_) => false,
            Err(err) => {
                warn!(target: "offline::cache", hash, error = %err, "Failed to count blob references");
                false
            }
        }
    }

    async fn invalidate(&self, file_id: &FileId) {
        self.metadata.lock().await.invalidate(file_id);
    }

    pub(crate) async fn publish_stats(&self) {
        if !self.events.wants_storage_updates() {
            return;
        }
        match self.stats().await {
            Ok(stats) => self.events.publish_storage_stats(&stats),
            Err(err) => {
                warn!(target: "offline::cache", error = %err, "Failed to compute storage stats");
            }
        }
    }
}

fn ensure_within_file_limit(size: u64, max_file_size: u64) -> Result<(), AppError> {
    if size > max_file_size {
        return Err(AppError::ValidationError(format!(
            "File is too large for offline storage ({} > {})",
            format_file_size(size),
            format_file_size(max_file_size)
        )));
    }
    Ok(())
}

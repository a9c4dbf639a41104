use crate::application::ports::network::NetworkMonitor;
use crate::application::ports::remote::{ProgressCallback, RemoteFileSource};
use crate::application::services::events::OfflineEvents;
use crate::application::services::in_flight::InFlightSet;
use crate::application::services::offline_file_cache::OfflineFileCache;
use crate::domain::entities::offline::{
    CategoryUsage, CleanupReport, DownloadProgress, FileItem, OfflineFile, OfflineFileInfo,
    OfflineStorageStats, StorageCategory, StorageValidation,
};
use crate::domain::value_objects::offline::{DownloadStatus, FileId, FileSyncStatus};
use crate::shared::config::DownloadConfig;
use crate::shared::error::AppError;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// `cleanup_storage` の既定の空き目標（総容量に対する %）
const DEFAULT_CLEANUP_PERCENT: u64 = 10;

#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub on_progress: Option<ProgressCallback>,
    /// Wi-Fi 限定設定でも従量課金回線での取得を許可する
    pub allow_metered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadReport {
    pub downloaded: Vec<FileId>,
    pub failed: Vec<(FileId, String)>,
    pub skipped: Vec<FileId>,
}

/// オフライン保存の方針（回線・容量・自動取得）を扱う窓口
pub struct OfflineManager {
    cache: Arc<OfflineFileCache>,
    source: Arc<dyn RemoteFileSource>,
    network: Arc<dyn NetworkMonitor>,
    events: Arc<OfflineEvents>,
    config: RwLock<DownloadConfig>,
    download_queue: InFlightSet,
}

/// 進捗の通知。完了・失敗を記録せずにドロップされたら `cancelled` を通知する。
struct DownloadTracker {
    events: Arc<OfflineEvents>,
    file_id: FileId,
    file_name: String,
    finished: bool,
}

impl DownloadTracker {
    fn start(events: Arc<OfflineEvents>, item: &FileItem) -> Self {
        events.publish_download_progress(&DownloadProgress::downloading(
            item.id.clone(),
            item.name.clone(),
            0,
        ));
        Self {
            events,
            file_id: item.id.clone(),
            file_name: item.name.clone(),
            finished: false,
        }
    }

    fn finish(mut self, status: DownloadStatus, error: Option<String>) {
        self.finished = true;
        self.publish(status, error);
    }

    fn publish(&self, status: DownloadStatus, error: Option<String>) {
        self.events.publish_download_progress(&DownloadProgress::finished(
            self.file_id.clone(),
            self.file_name.clone(),
            status,
            error,
        ));
    }
}

impl Drop for DownloadTracker {
    fn drop(&mut self) {
        if !self.finished {
            debug!(target: "offline::download", file_id = %self.file_id, "Download cancelled");
            self.publish(DownloadStatus::Cancelled, None);
        }
    }
}

impl OfflineManager {
    pub fn new(
        cache: Arc<OfflineFileCache>,
        source: Arc<dyn RemoteFileSource>,
        network: Arc<dyn NetworkMonitor>,
        events: Arc<OfflineEvents>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            cache,
            source,
            network,
            events,
            config: RwLock::new(config),
            download_queue: InFlightSet::new(),
        }
    }

    pub fn config(&self) -> DownloadConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_config(&self, config: DownloadConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        debug!(target: "offline::download", "Download settings updated");
    }

    pub async fn download_for_offline(
        &self,
        item: &FileItem,
        options: DownloadOptions,
    ) -> Result<OfflineFile, AppError> {
        if item.is_folder() {
            return Err(AppError::ValidationError(
                "Folders cannot be downloaded for offline use".to_string(),
            ));
        }
        let _queued = self.download_queue.try_acquire(&item.id).ok_or_else(|| {
            AppError::ValidationError(format!("{} is already being downloaded", item.name))
        })?;

        self.ensure_network_allows_download(options.allow_metered)
            .await?;

        if self.cache.is_available(&item.id).await? {
            let on_progress: ProgressCallback = match options.on_progress {
                Some(callback) => callback,
                None => Arc::new(|_: u8| {}),
            };
            return self.cache.download(item, on_progress).await;
        }

        let validation = self.validate_storage_space(item.size_or_zero()).await?;
        if !validation.can_download {
            return Err(AppError::ValidationError(
                validation
                    .message
                    .unwrap_or_else(|| "Not enough storage space".to_string()),
            ));
        }

        let tracker = DownloadTracker::start(Arc::clone(&self.events), item);
        let events = Arc::clone(&self.events);
        let file_id = item.id.clone();
        let file_name = item.name.clone();
        let user_progress = options.on_progress;
        let on_progress: ProgressCallback = Arc::new(move |progress| {
            events.publish_download_progress(&DownloadProgress::downloading(
                file_id.clone(),
                file_name.clone(),
                progress,
            ));
            if let Some(callback) = &user_progress {
                callback(progress.min(100));
            }
        });

        match self.cache.download(item, on_progress).await {
            Ok(file) => {
                tracker.finish(DownloadStatus::Completed, None);
                Ok(file)
            }
            Err(err) => {
                warn!(
                    target: "offline::download",
                    file_id = %item.id,
                    error = %err,
                    "Offline download failed"
                );
                tracker.finish(DownloadStatus::Failed, Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// 複数ファイルを順に取得する。失敗したファイルは記録して続行する。
    pub async fn download_multiple_for_offline(
        &self,
        items: &[FileItem],
        on_overall_progress: Option<ProgressCallback>,
    ) -> BatchDownloadReport {
        let mut report = BatchDownloadReport::default();
        let total = items.len().max(1) as f64;

        for (completed, item) in items.iter().enumerate() {
            let overall = on_overall_progress.clone().map(|callback| {
                let callback: ProgressCallback = Arc::new(move |progress: u8| {
                    let ratio = (completed as f64 + f64::from(progress.min(100)) / 100.0) / total;
                    callback((ratio * 100.0).round() as u8);
                });
                callback
            });
            let options = DownloadOptions {
                on_progress: overall,
                allow_metered: false,
            };
            match self.download_for_offline(item, options).await {
                Ok(_) => report.downloaded.push(item.id.clone()),
                Err(err) => {
                    warn!(
                        target: "offline::download",
                        file_id = %item.id,
                        error = %err,
                        "Skipping file in batch download"
                    );
                    report.failed.push((item.id.clone(), err.to_string()));
                }
            }
        }

        if let Some(callback) = on_overall_progress {
            callback(100);
        }
        report
    }

    pub async fn auto_download_starred(&self) -> Result<BatchDownloadReport, AppError> {
        let config = self.config();
        if !config.auto_download_starred {
            return Ok(BatchDownloadReport::default());
        }
        let candidates = match self.source.starred_files().await {
            Ok(files) => files,
            Err(err) => {
                warn!(target: "offline::download", error = %err, "Failed to list starred files");
                return Ok(BatchDownloadReport::default());
            }
        };
        self.auto_download(candidates, &config).await
    }

    pub async fn auto_download_recent(&self) -> Result<BatchDownloadReport, AppError> {
        let config = self.config();
        if !config.auto_download_recent {
            return Ok(BatchDownloadReport::default());
        }
        let candidates = match self.source.recent_files(config.recent_files_limit).await {
            Ok(files) => files,
            Err(err) => {
                warn!(target: "offline::download", error = %err, "Failed to list recent files");
                return Ok(BatchDownloadReport::default());
            }
        };
        self.auto_download(candidates, &config).await
    }

    async fn auto_download(
        &self,
        candidates: Vec<FileItem>,
        config: &DownloadConfig,
    ) -> Result<BatchDownloadReport, AppError> {
        let mut report = BatchDownloadReport::default();
        if self.ensure_network_allows_download(false).await.is_err() {
            debug!(target: "offline::download", "Network policy does not allow auto download");
            return Ok(report);
        }

        let mut seen = HashSet::new();
        for item in candidates {
            if !seen.insert(item.id.clone()) {
                continue;
            }
            let too_large = item
                .size
                .map(|size| size > config.max_auto_download_size)
                .unwrap_or(true);
            if item.is_folder() || too_large {
                report.skipped.push(item.id);
                continue;
            }
            match self.cache.is_available(&item.id).await {
                Ok(true) => {
                    report.skipped.push(item.id);
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        target: "offline::download",
                        file_id = %item.id,
                        error = %err,
                        "Could not check cached copy; skipping auto download"
                    );
                    report.failed.push((item.id, err.to_string()));
                    continue;
                }
            }
            match self
                .download_for_offline(&item, DownloadOptions::default())
                .await
            {
                Ok(_) => report.downloaded.push(item.id),
                Err(err) => {
                    warn!(
                        target: "offline::download",
                        file_id = %item.id,
                        error = %err,
                        "Auto download failed"
                    );
                    report.failed.push((item.id, err.to_string()));
                }
            }
        }

        info!(
            target: "offline::download",
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "Auto download finished"
        );
        Ok(report)
    }

    pub async fn validate_storage_space(
        &self,
        file_size: u64,
    ) -> Result<StorageValidation, AppError> {
        let stats = self.cache.stats().await?;
        Ok(stats.validate_download(file_size))
    }

    /// 未キャッシュのファイルでも失敗しない
    pub async fn get_file_info_with_offline_status(&self, item: FileItem) -> OfflineFileInfo {
        let cached = match self.cache.get(&item.id).await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(
                    target: "offline::download",
                    file_id = %item.id,
                    error = %err,
                    "Failed to read offline status"
                );
                None
            }
        };
        let is_downloading = self.is_download_in_progress(&item.id);
        OfflineFileInfo::new(item, cached.as_ref(), is_downloading)
    }

    pub async fn get_files_info_with_offline_status(
        &self,
        items: Vec<FileItem>,
    ) -> Vec<OfflineFileInfo> {
        let mut infos = Vec::with_capacity(items.len());
        for item in items {
            infos.push(self.get_file_info_with_offline_status(item).await);
        }
        infos
    }

    pub fn is_download_in_progress(&self, file_id: &FileId) -> bool {
        self.download_queue.contains(file_id) || self.cache.is_downloading(file_id)
    }

    pub fn download_queue(&self) -> Vec<FileId> {
        self.download_queue.snapshot()
    }

    pub async fn remove_from_offline(&self, file_id: &FileId) -> Result<bool, AppError> {
        self.cache.remove(file_id).await
    }

    pub async fn clear_all_offline_files(&self) -> Result<u64, AppError> {
        self.cache.clear_all().await
    }

    /// 空き容量が `target_free_space`（既定は総容量の 10%）に届くまで追い出す
    pub async fn cleanup_storage(
        &self,
        target_free_space: Option<u64>,
    ) -> Result<CleanupReport, AppError> {
        let stats = self.cache.stats().await?;
        let target =
            target_free_space.unwrap_or(stats.total_size / 100 * DEFAULT_CLEANUP_PERCENT);
        if stats.available_size >= target {
            return Ok(CleanupReport::default());
        }
        self.cache.cleanup(target - stats.available_size).await
    }

    pub async fn mark_file_as_accessed(&self, file_id: &FileId) -> Result<bool, AppError> {
        self.cache.mark_accessed(file_id).await
    }

    pub async fn modified_files(&self) -> Result<Vec<OfflineFile>, AppError> {
        self.cache.list_by_status(FileSyncStatus::Modified).await
    }

    pub async fn conflict_files(&self) -> Result<Vec<OfflineFile>, AppError> {
        self.cache.list_by_status(FileSyncStatus::Conflict).await
    }

    pub async fn storage_stats(&self) -> Result<OfflineStorageStats, AppError> {
        self.cache.stats().await
    }

    pub async fn storage_usage_by_type(
        &self,
    ) -> Result<BTreeMap<StorageCategory, CategoryUsage>, AppError> {
        self.cache.usage_by_category().await
    }

    async fn ensure_network_allows_download(&self, allow_metered: bool) -> Result<(), AppError> {
        let state = self.network.current().await;
        if !state.is_connected {
            return Err(AppError::Network(
                "No network connection available for download".to_string(),
            ));
        }
        if self.config().wifi_only && !allow_metered && !state.kind.is_unmetered() {
            return Err(AppError::ValidationError(
                "WiFi connection required for offline downloads".to_string(),
            ));
        }
        Ok(())
    }
}

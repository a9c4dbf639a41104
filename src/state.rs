use crate::application::ports::edit_store::{LocalEditStore, WorkingCopyStore};
use crate::application::ports::file_store::OfflineFileStore;
use crate::application::ports::network::NetworkMonitor;
use crate::application::ports::remote::{RemoteDocumentApi, RemoteFileSource};
use crate::application::services::{
    CacheLimits, OfflineEditingService, OfflineEvents, OfflineFileCache, OfflineManager,
    SyncPolicy, SyncService,
};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::offline::{SqliteEditStore, SqliteFileStore};
use crate::infrastructure::storage::FsBlobStorage;
use crate::shared::config::{AppConfig, DownloadConfig, SyncConfig};
use crate::shared::error::AppError;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// エンジンの外側から渡す協調オブジェクト
#[derive(Clone)]
pub struct EngineCollaborators {
    pub documents: Arc<dyn RemoteDocumentApi>,
    pub files: Arc<dyn RemoteFileSource>,
    pub network: Arc<dyn NetworkMonitor>,
}

/// オフライン機能全体の状態を保持する構造体
pub struct OfflineEngine {
    config: Mutex<AppConfig>,
    pool: ConnectionPool,
    events: Arc<OfflineEvents>,
    cache: Arc<OfflineFileCache>,
    sync: Arc<SyncService>,
    editing: Arc<OfflineEditingService>,
    manager: Arc<OfflineManager>,
    auto_download: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineEngine {
    /// DB を開いてマイグレーションを適用し、エンジンを起動する
    pub async fn init(
        config: AppConfig,
        collaborators: EngineCollaborators,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        let pool = ConnectionPool::from_config(&config.database).await?;
        pool.migrate().await?;
        Self::init_with_pool(config, pool, collaborators).await
    }

    /// マイグレーション済みのプールで起動する
    pub async fn init_with_pool(
        config: AppConfig,
        pool: ConnectionPool,
        collaborators: EngineCollaborators,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let blobs = Arc::new(FsBlobStorage::new(config.storage.data_dir.clone()).await?);
        let edit_store = Arc::new(SqliteEditStore::new(
            pool.clone(),
            config.sync.max_queue_size,
        ));
        let file_store: Arc<dyn OfflineFileStore> = Arc::new(SqliteFileStore::new(pool.clone()));
        let events = Arc::new(OfflineEvents::new());

        let cache = Arc::new(OfflineFileCache::new(
            file_store,
            blobs,
            Arc::clone(&collaborators.files),
            Arc::clone(&events),
            CacheLimits::from(&config.storage),
            config.storage.metadata_cache_capacity,
        ));
        let edits: Arc<dyn LocalEditStore> = edit_store.clone();
        let working_copies: Arc<dyn WorkingCopyStore> = edit_store;
        let sync = Arc::new(SyncService::new(
            Arc::clone(&edits),
            Arc::clone(&cache),
            Arc::clone(&collaborators.documents),
            Arc::clone(&events),
            SyncPolicy::from_config(&config.sync),
        ));
        let editing = Arc::new(OfflineEditingService::new(
            Arc::clone(&edits),
            working_copies,
            Arc::clone(&cache),
            Arc::clone(&sync),
        ));
        let manager = Arc::new(OfflineManager::new(
            Arc::clone(&cache),
            Arc::clone(&collaborators.files),
            Arc::clone(&collaborators.network),
            Arc::clone(&events),
            config.download.clone(),
        ));

        // 前回終了時に反映途中だった編集を戻し、参照されないブロブを掃除する
        let recovered = edits.recover_in_flight().await?;
        let swept = cache.sweep_orphans().await?;
        info!(
            target: "offline::engine",
            recovered,
            swept,
            data_dir = %config.storage.data_dir.display(),
            "Offline engine initialized"
        );

        sync.start(Arc::clone(&collaborators.network)).await;

        let engine = Self {
            config: Mutex::new(config),
            pool,
            events,
            cache,
            sync,
            editing,
            manager,
            auto_download: Mutex::new(None),
        };
        engine.spawn_auto_download();
        Ok(engine)
    }

    pub fn editing(&self) -> &Arc<OfflineEditingService> {
        &self.editing
    }

    pub fn manager(&self) -> &Arc<OfflineManager> {
        &self.manager
    }

    pub fn sync(&self) -> &Arc<SyncService> {
        &self.sync
    }

    pub fn cache(&self) -> &Arc<OfflineFileCache> {
        &self.cache
    }

    pub fn events(&self) -> &Arc<OfflineEvents> {
        &self.events
    }

    pub fn config(&self) -> AppConfig {
        lock(&self.config).clone()
    }

    /// 同期とダウンロードの設定を差し替える。定期同期の間隔も作り直す。
    pub fn update_config(
        &self,
        sync: SyncConfig,
        download: DownloadConfig,
    ) -> Result<(), AppError> {
        let mut next = self.config();
        next.sync = sync;
        next.download = download;
        next.validate().map_err(AppError::ConfigurationError)?;

        self.sync.update_policy(SyncPolicy::from_config(&next.sync));
        self.manager.update_config(next.download.clone());
        *lock(&self.config) = next;
        self.spawn_auto_download();
        Ok(())
    }

    /// トリガーを止めて DB を閉じる
    pub async fn dispose(&self) {
        self.sync.stop();
        if let Some(handle) = lock(&self.auto_download).take() {
            handle.abort();
        }
        self.pool.close().await;
        info!(target: "offline::engine", "Offline engine disposed");
    }

    fn spawn_auto_download(&self) {
        let download = lock(&self.config).download.clone();
        if !download.auto_download_starred && !download.auto_download_recent {
            return;
        }
        let manager = Arc::clone(&self.manager);
        let handle = tokio::spawn(async move {
            if let Err(err) = manager.auto_download_starred().await {
                warn!(target: "offline::download", error = %err, "Starred auto download failed");
            }
            if let Err(err) = manager.auto_download_recent().await {
                warn!(target: "offline::download", error = %err, "Recent auto download failed");
            }
        });
        if let Some(previous) = lock(&self.auto_download).replace(handle) {
            previous.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

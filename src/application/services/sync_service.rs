use crate::application::ports::edit_store::LocalEditStore;
use crate::application::ports::network::NetworkMonitor;
use crate::application::ports::remote::{RemoteAck, RemoteDocumentApi, RemoteError};
use crate::application::services::events::OfflineEvents;
use crate::application::services::offline_file_cache::OfflineFileCache;
use crate::domain::entities::offline::{
    ConflictResolution, FileConflict, OfflineEdit, SyncReport, WorkQueueStatus,
};
use crate::domain::value_objects::offline::{
    EditId, EditPayload, EditSyncStatus, EditType, FileId, FileSyncStatus, NetworkState,
    SyncTrigger,
};
use crate::infrastructure::offline::metrics::{
    SyncAttemptMetadata, SyncMetrics, SyncMetricsSnapshot, SyncOutcome,
};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 再試行とタイムアウトの方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub auto_sync: bool,
    pub interval: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
    pub retain_synced_edits: bool,
}

impl SyncPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            auto_sync: config.auto_sync,
            interval: Duration::from_millis(config.sync_interval_ms),
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            retain_synced_edits: config.retain_synced_edits,
        }
    }

    /// `attempt` 回目の失敗後の待ち時間（base × 2^(attempt-1)）
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// 1 件の編集を反映した結果
enum EditOutcome {
    Synced,
    Failed,
    Conflict,
    /// 同じファイルの別編集が反映中
    Busy,
}

/// 未同期の編集をリモートへ反映する作業キュー。
///
/// 同時に走る同期は 1 つだけで、2 つ目の呼び出しは何もせず戻る。
/// ファイルごとに作成順で反映し、失敗・衝突したファイルはその時点で止めて
/// 後続の編集を先に送らない。
pub struct SyncService {
    edits: Arc<dyn LocalEditStore>,
    cache: Arc<OfflineFileCache>,
    remote: Arc<dyn RemoteDocumentApi>,
    events: Arc<OfflineEvents>,
    metrics: Arc<SyncMetrics>,
    policy: Mutex<SyncPolicy>,
    is_processing: AtomicBool,
    last_sync_attempt: Mutex<Option<DateTime<Utc>>>,
    // 衝突を KeepLocal で解消したファイルの、次回送信時の基準版
    rebased_versions: Mutex<HashMap<FileId, Option<i64>>>,
    is_online: Arc<AtomicBool>,
    triggers: Mutex<TriggerHandles>,
}

#[derive(Default)]
struct TriggerHandles {
    network: Option<Arc<dyn NetworkMonitor>>,
    reconnect: Option<JoinHandle<()>>,
    interval: Option<JoinHandle<()>>,
}

/// 処理中フラグを確保し、ドロップ時（キャンセル含む）に戻す
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncService {
    pub fn new(
        edits: Arc<dyn LocalEditStore>,
        cache: Arc<OfflineFileCache>,
        remote: Arc<dyn RemoteDocumentApi>,
        events: Arc<OfflineEvents>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            edits,
            cache,
            remote,
            events,
            metrics: Arc::new(SyncMetrics::new()),
            policy: Mutex::new(policy),
            is_processing: AtomicBool::new(false),
            last_sync_attempt: Mutex::new(None),
            rebased_versions: Mutex::new(HashMap::new()),
            is_online: Arc::new(AtomicBool::new(false)),
            triggers: Mutex::new(TriggerHandles::default()),
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        *lock(&self.policy)
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::Acquire)
    }

    /// 手動同期。失敗済みの編集も再試行対象に戻す。
    pub async fn sync_pending(&self) -> Result<SyncReport, AppError> {
        self.sync_pending_with(SyncTrigger::Manual).await
    }

    pub async fn sync_pending_with(&self, trigger: SyncTrigger) -> Result<SyncReport, AppError> {
        let Some(guard) = ProcessingGuard::acquire(&self.is_processing) else {
            debug!(target: "offline::sync", %trigger, "Sync already running; skipping");
            return Ok(SyncReport::already_running());
        };
        *lock(&self.last_sync_attempt) = Some(Utc::now());
        self.publish_queue().await;

        let started = Instant::now();
        let result = self.drain(trigger).await;
        drop(guard);
        self.publish_queue().await;

        match &result {
            Ok(report) => info!(
                target: "offline::sync",
                %trigger,
                synced = report.synced,
                failed = report.failed,
                conflicts = report.conflicts.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sync run finished"
            ),
            Err(err) => error!(target: "offline::sync", %trigger, error = %err, "Sync run aborted"),
        }
        result
    }

    async fn drain(&self, trigger: SyncTrigger) -> Result<SyncReport, AppError> {
        if trigger.retries_failed() {
            let reset = self.edits.reset_failed(None).await?;
            if reset > 0 {
                debug!(target: "offline::sync", reset, "Failed edits returned to the queue");
            }
        }

        let policy = self.policy();
        let mut report = SyncReport::default();
        for file_id in self.edits.pending_file_ids().await? {
            self.sync_file(&file_id, trigger, &policy, &mut report)
                .await?;
        }
        Ok(report)
    }

    async fn sync_file(
        &self,
        file_id: &FileId,
        trigger: SyncTrigger,
        policy: &SyncPolicy,
        report: &mut SyncReport,
    ) -> Result<(), AppError> {
        if self.edits.get_conflict(file_id).await?.is_some() {
            debug!(target: "offline::sync", %file_id, "File has an unresolved conflict; skipping");
            report.skipped_files.push(file_id.clone());
            return Ok(());
        }

        let cached = self.cache.get(file_id).await?;
        if matches!(&cached, Some(file) if file.sync_status == FileSyncStatus::Conflict) {
            report.skipped_files.push(file_id.clone());
            return Ok(());
        }
        let rebased = lock(&self.rebased_versions).get(file_id).copied();
        let mut version = match rebased {
            Some(version) => version,
            None => cached.and_then(|file| file.remote_version),
        };

        let pending = self.edits.list_pending(Some(file_id)).await?;
        let latest_content = latest_of(&pending, EditType::Content);
        let latest_title = latest_of(&pending, EditType::Title);
        let mut superseded: HashMap<EditType, Vec<EditId>> = HashMap::new();

        for (index, edit) in pending.iter().enumerate() {
            if edit.sync_status == EditSyncStatus::Failed {
                // 定期同期では失敗済みを飛ばさず、そのファイルを止める
                report.skipped_files.push(file_id.clone());
                return Ok(());
            }

            let latest = match edit.edit_type {
                EditType::Content => latest_content,
                EditType::Title => latest_title,
                _ => None,
            };
            if matches!(latest, Some(latest) if latest != index) {
                superseded
                    .entry(edit.edit_type)
                    .or_default()
                    .push(edit.id.clone());
                continue;
            }

            match self
                .apply_with_retry(edit, &mut version, trigger, policy, report)
                .await?
            {
                EditOutcome::Synced => {
                    report.synced += 1;
                    for older in superseded.remove(&edit.edit_type).unwrap_or_default() {
                        self.edits.mark_synced(&older).await?;
                        report.synced += 1;
                    }
                }
                EditOutcome::Failed => {
                    report.failed += 1;
                    return Ok(());
                }
                EditOutcome::Conflict => {
                    report.conflicts.push(file_id.clone());
                    return Ok(());
                }
                EditOutcome::Busy => {
                    report.skipped_files.push(file_id.clone());
                    return Ok(());
                }
            }
        }

        lock(&self.rebased_versions).remove(file_id);
        if self.edits.list_pending(Some(file_id)).await?.is_empty() {
            self.cache.mark_synced(file_id).await?;
            if !policy.retain_synced_edits {
                self.edits.prune_synced(Some(file_id)).await?;
            }
        }
        Ok(())
    }

    async fn apply_with_retry(
        &self,
        edit: &OfflineEdit,
        version: &mut Option<i64>,
        trigger: SyncTrigger,
        policy: &SyncPolicy,
        report: &mut SyncReport,
    ) -> Result<EditOutcome, AppError> {
        let mut retry_count = edit.retry_count;
        loop {
            if !self.edits.mark_syncing(&edit.id).await? {
                return Ok(EditOutcome::Busy);
            }

            let started = Instant::now();
            let result = match tokio::time::timeout(
                policy.request_timeout,
                self.apply(edit, *version),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout),
            };
            let mut meta = SyncAttemptMetadata {
                edit_id: Some(edit.id.to_string()),
                file_id: Some(edit.file_id.to_string()),
                trigger: Some(trigger.to_string()),
                retry_count: Some(retry_count),
                max_retries: Some(policy.max_retries),
                duration_ms: Some(started.elapsed().as_millis() as u64),
                ..SyncAttemptMetadata::default()
            };

            match result {
                Ok(ack) => {
                    self.edits.mark_synced(&edit.id).await?;
                    if let Some(next) = ack.version {
                        *version = Some(next);
                        // 途中で止まっても次回は確定済みの版から送る
                        if let Some(rebased) =
                            lock(&self.rebased_versions).get_mut(&edit.file_id)
                        {
                            *rebased = Some(next);
                        }
                        self.cache.set_remote_version(&edit.file_id, Some(next)).await?;
                    }
                    self.metrics.record(SyncOutcome::Success, meta);
                    debug!(
                        target: "offline::sync",
                        edit_id = %edit.id,
                        file_id = %edit.file_id,
                        edit_type = %edit.edit_type,
                        "Edit synced"
                    );
                    self.publish_queue().await;
                    return Ok(EditOutcome::Synced);
                }
                Err(RemoteError::Conflict {
                    message,
                    remote_version,
                }) => {
                    self.edits.release(&edit.id).await?;
                    self.edits
                        .record_conflict(&FileConflict {
                            file_id: edit.file_id.clone(),
                            edit_id: edit.id.clone(),
                            message: message.clone(),
                            remote_version,
                            detected_at: Utc::now(),
                        })
                        .await?;
                    self.cache.mark_conflict(&edit.file_id).await?;
                    meta.error = Some(message.clone());
                    self.metrics.record(SyncOutcome::Conflict, meta);
                    warn!(
                        target: "offline::sync",
                        edit_id = %edit.id,
                        file_id = %edit.file_id,
                        message = %message,
                        "Remote conflict; holding edits for this file"
                    );
                    self.publish_queue().await;
                    return Ok(EditOutcome::Conflict);
                }
                Err(err) if err.is_retryable() => {
                    let message = err.to_string();
                    retry_count += 1;
                    meta.error = Some(message.clone());
                    meta.retry_count = Some(retry_count);

                    if retry_count >= policy.max_retries {
                        self.edits.mark_failed(&edit.id, &message).await?;
                        self.metrics.record(SyncOutcome::Failure, meta);
                        error!(
                            target: "offline::sync",
                            edit_id = %edit.id,
                            file_id = %edit.file_id,
                            retry_count,
                            error = %message,
                            "Edit failed after exhausting retries"
                        );
                        self.publish_queue().await;
                        return Ok(EditOutcome::Failed);
                    }

                    self.edits.requeue(&edit.id, &message).await?;
                    let backoff = policy.backoff_for(retry_count);
                    meta.backoff_ms = Some(backoff.as_millis() as u64);
                    self.metrics.record(SyncOutcome::Retry, meta);
                    report.requeued += 1;
                    warn!(
                        target: "offline::sync",
                        edit_id = %edit.id,
                        retry_count,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Edit sync failed; retrying"
                    );
                    self.publish_queue().await;
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    let message = err.to_string();
                    self.edits.mark_failed(&edit.id, &message).await?;
                    meta.error = Some(message.clone());
                    self.metrics.record(SyncOutcome::Failure, meta);
                    error!(
                        target: "offline::sync",
                        edit_id = %edit.id,
                        file_id = %edit.file_id,
                        error = %message,
                        "Remote rejected edit"
                    );
                    self.publish_queue().await;
                    return Ok(EditOutcome::Failed);
                }
            }
        }
    }

    async fn apply(
        &self,
        edit: &OfflineEdit,
        base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError> {
        match &edit.payload {
            EditPayload::Content { content } => {
                self.remote
                    .save_content(&edit.file_id, content, base_version)
                    .await
            }
            EditPayload::Title { title } => {
                self.remote
                    .update_title(&edit.file_id, title, base_version)
                    .await
            }
            EditPayload::Cell {
                cell_ref,
                value,
                formula,
            } => {
                self.remote
                    .update_cell(&edit.file_id, cell_ref, value, formula.as_deref())
                    .await
            }
        }
    }

    pub async fn queue_status(&self) -> Result<WorkQueueStatus, AppError> {
        let counts = self.edits.counts().await?;
        Ok(WorkQueueStatus::from_counts(
            counts,
            self.is_processing(),
            *lock(&self.last_sync_attempt),
        ))
    }

    pub async fn conflicts(&self) -> Result<Vec<FileConflict>, AppError> {
        self.edits.list_conflicts().await
    }

    /// 衝突を解消する。`KeepLocal` はリモートの版を基準に送り直し、
    /// `DiscardLocal` はローカルの編集とキャッシュを捨てる。
    pub async fn resolve_conflict(
        &self,
        file_id: &FileId,
        resolution: ConflictResolution,
    ) -> Result<SyncReport, AppError> {
        let conflict = self.edits.get_conflict(file_id).await?;
        let cached = self.cache.get(file_id).await?;
        let cache_in_conflict =
            matches!(&cached, Some(file) if file.sync_status == FileSyncStatus::Conflict);
        if conflict.is_none() && !cache_in_conflict {
            return Err(AppError::NotFound(format!(
                "No conflict recorded for {file_id}"
            )));
        }

        match resolution {
            ConflictResolution::KeepLocal => {
                let remote_version = conflict.and_then(|conflict| conflict.remote_version);
                if remote_version.is_some() {
                    lock(&self.rebased_versions).insert(file_id.clone(), remote_version);
                    self.cache.set_remote_version(file_id, remote_version).await?;
                }
                self.edits.clear_conflict(file_id).await?;
                self.cache.clear_conflict(file_id).await?;
                info!(target: "offline::sync", %file_id, "Conflict resolved by keeping local edits");
                self.publish_queue().await;
                self.sync_pending().await
            }
            ConflictResolution::DiscardLocal => {
                let removed = self.edits.clear(file_id).await?;
                lock(&self.rebased_versions).remove(file_id);
                self.cache.remove(file_id).await?;
                info!(
                    target: "offline::sync",
                    %file_id,
                    removed,
                    "Conflict resolved by discarding local edits"
                );
                self.publish_queue().await;
                Ok(SyncReport::default())
            }
        }
    }

    /// 再接続と定期同期のトリガーを開始する
    pub async fn start(self: &Arc<Self>, network: Arc<dyn NetworkMonitor>) {
        self.stop();

        let initial = network.current().await;
        self.is_online.store(initial.is_connected, Ordering::Release);
        let receiver = network.subscribe();
        let reconnect = tokio::spawn(reconnect_loop(
            Arc::downgrade(self),
            Arc::clone(&network),
            receiver,
        ));

        {
            let mut triggers = lock(&self.triggers);
            triggers.network = Some(network);
            triggers.reconnect = Some(reconnect);
        }
        self.restart_interval();

        info!(
            target: "offline::sync",
            online = initial.is_connected,
            kind = ?initial.kind,
            "Sync triggers started"
        );

        if initial.is_connected && self.policy().auto_sync {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.run_if_outstanding(SyncTrigger::Reconnect).await;
            });
        }
    }

    pub fn stop(&self) {
        let mut triggers = lock(&self.triggers);
        if let Some(handle) = triggers.reconnect.take() {
            handle.abort();
        }
        if let Some(handle) = triggers.interval.take() {
            handle.abort();
        }
        triggers.network = None;
    }

    pub fn update_policy(self: &Arc<Self>, policy: SyncPolicy) {
        *lock(&self.policy) = policy;
        let started = lock(&self.triggers).network.is_some();
        if started {
            self.restart_interval();
        }
    }

    fn restart_interval(self: &Arc<Self>) {
        let policy = self.policy();
        let mut triggers = lock(&self.triggers);
        if let Some(handle) = triggers.interval.take() {
            handle.abort();
        }
        if policy.auto_sync && !policy.interval.is_zero() {
            triggers.interval = Some(tokio::spawn(interval_loop(
                Arc::downgrade(self),
                policy.interval,
            )));
        }
    }

    async fn run_if_outstanding(&self, trigger: SyncTrigger) {
        let status = match self.queue_status().await {
            Ok(status) => status,
            Err(err) => {
                warn!(target: "offline::sync", error = %err, "Failed to read queue status");
                return;
            }
        };
        let outstanding = match trigger {
            SyncTrigger::Interval => status.pending_edits > 0,
            _ => status.has_outstanding(),
        };
        if !outstanding {
            return;
        }
        // 結果はログ済み
        let _ = self.sync_pending_with(trigger).await;
    }

    pub(crate) async fn publish_queue(&self) {
        if !self.events.wants_queue_updates() {
            return;
        }
        match self.edits.list_pending(None).await {
            Ok(edits) => self.events.publish_pending_edits(edits),
            Err(err) => {
                warn!(target: "offline::sync", error = %err, "Failed to load pending edits");
            }
        }
        match self.queue_status().await {
            Ok(status) => self.events.publish_queue_status(&status),
            Err(err) => {
                warn!(target: "offline::sync", error = %err, "Failed to load queue status");
            }
        }
    }
}

async fn reconnect_loop(
    service: Weak<SyncService>,
    network: Arc<dyn NetworkMonitor>,
    mut receiver: broadcast::Receiver<NetworkState>,
) {
    loop {
        let state = match receiver.recv().await {
            Ok(state) => state,
            Err(RecvError::Lagged(skipped)) => {
                debug!(target: "offline::network", skipped, "Network updates lagged; polling");
                network.current().await
            }
            Err(RecvError::Closed) => break,
        };
        let Some(service) = service.upgrade() else {
            break;
        };
        let was_online = service.is_online.swap(state.is_connected, Ordering::AcqRel);
        if state.is_connected && !was_online {
            info!(target: "offline::network", kind = ?state.kind, "Connection restored");
            if service.policy().auto_sync {
                service.run_if_outstanding(SyncTrigger::Reconnect).await;
            }
        } else if !state.is_connected && was_online {
            info!(target: "offline::network", "Connection lost; edits will queue locally");
        }
    }
}

async fn interval_loop(service: Weak<SyncService>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // 初回は即時に発火するため読み捨てる
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(service) = service.upgrade() else {
            break;
        };
        if service.is_online() {
            service.run_if_outstanding(SyncTrigger::Interval).await;
        }
    }
}

fn latest_of(edits: &[OfflineEdit], edit_type: EditType) -> Option<usize> {
    edits.iter().rposition(|edit| edit.edit_type == edit_type)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64) -> SyncPolicy {
        SyncPolicy::from_config(&SyncConfig {
            retry_base_delay_ms: base_ms,
            ..SyncConfig::default()
        })
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = policy(100);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_retries_still_allows_one_attempt() {
        let policy = SyncPolicy::from_config(&SyncConfig {
            max_retries: 0,
            ..SyncConfig::default()
        });
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn processing_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = ProcessingGuard::acquire(&flag).expect("first");
        assert!(ProcessingGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(ProcessingGuard::acquire(&flag).is_some());
    }

    #[test]
    fn latest_snapshot_index_is_found_per_type() {
        use crate::domain::value_objects::offline::FileType;
        let file_id = FileId::new("doc".into()).unwrap();
        let edit = |payload: EditPayload| {
            OfflineEdit::new(
                0,
                EditId::generate(),
                file_id.clone(),
                FileType::Document,
                payload.edit_type(),
                payload,
                Utc::now(),
                EditSyncStatus::Pending,
                0,
                None,
                Utc::now(),
            )
        };
        let edits = vec![
            edit(EditPayload::content("a")),
            edit(EditPayload::title("t")),
            edit(EditPayload::content("b")),
        ];
        assert_eq!(latest_of(&edits, EditType::Content), Some(2));
        assert_eq!(latest_of(&edits, EditType::Title), Some(1));
        assert_eq!(latest_of(&edits, EditType::Cell), None);
    }
}

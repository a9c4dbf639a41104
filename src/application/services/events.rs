use crate::domain::entities::offline::{
    DownloadProgress, OfflineEdit, OfflineStorageStats, WorkQueueStatus,
};
use crate::shared::observer::{ListenerRegistry, Subscription};

/// UI 向けの変更通知。購読は `Subscription` を drop すると解除される。
#[derive(Default)]
pub struct OfflineEvents {
    pending_edits: ListenerRegistry<Vec<OfflineEdit>>,
    queue_status: ListenerRegistry<WorkQueueStatus>,
    storage_stats: ListenerRegistry<OfflineStorageStats>,
    download_progress: ListenerRegistry<DownloadProgress>,
}

impl OfflineEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未同期編集の一覧が変わるたびに呼ばれる
    pub fn on_pending_edits<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<OfflineEdit>) + Send + Sync + 'static,
    {
        self.pending_edits.subscribe(listener)
    }

    pub fn on_queue_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WorkQueueStatus) + Send + Sync + 'static,
    {
        self.queue_status.subscribe(listener)
    }

    pub fn on_storage_stats<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&OfflineStorageStats) + Send + Sync + 'static,
    {
        self.storage_stats.subscribe(listener)
    }

    pub fn on_download_progress<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.download_progress.subscribe(listener)
    }

    pub(crate) fn publish_pending_edits(&self, edits: Vec<OfflineEdit>) {
        self.pending_edits.emit(&edits);
    }

    pub(crate) fn publish_queue_status(&self, status: &WorkQueueStatus) {
        self.queue_status.emit(status);
    }

    pub(crate) fn publish_storage_stats(&self, stats: &OfflineStorageStats) {
        self.storage_stats.emit(stats);
    }

    pub(crate) fn publish_download_progress(&self, progress: &DownloadProgress) {
        self.download_progress.emit(progress);
    }

    pub(crate) fn wants_queue_updates(&self) -> bool {
        self.pending_edits.listener_count() > 0 || self.queue_status.listener_count() > 0
    }

    pub(crate) fn wants_storage_updates(&self) -> bool {
        self.storage_stats.listener_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dropped_subscription_stops_delivery() {
        let events = OfflineEvents::new();
        let received = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&received);
        let subscription = events.on_queue_status(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(events.wants_queue_updates());

        events.publish_queue_status(&WorkQueueStatus::default());
        drop(subscription);
        events.publish_queue_status(&WorkQueueStatus::default());

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert!(!events.wants_queue_updates());
    }
}

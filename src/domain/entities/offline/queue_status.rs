use super::EditCounts;
use crate::domain::value_objects::offline::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 作業キューの状態（保存せず、都度ストアから導出する）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkQueueStatus {
    pub total_edits: u64,
    pub pending_edits: u64,
    pub failed_edits: u64,
    pub is_processing: bool,
    pub last_sync_attempt: Option<DateTime<Utc>>,
}

impl WorkQueueStatus {
    pub fn from_counts(
        counts: EditCounts,
        is_processing: bool,
        last_sync_attempt: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            total_edits: counts.total,
            // syncing は未反映のため pending 側に数える
            pending_edits: counts.pending + counts.syncing,
            failed_edits: counts.failed,
            is_processing,
            last_sync_attempt,
        }
    }

    pub fn has_outstanding(&self) -> bool {
        self.pending_edits > 0 || self.failed_edits > 0
    }
}

/// 1 回の同期実行の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: u32,
    pub failed: u32,
    pub requeued: u32,
    pub conflicts: Vec<FileId>,
    pub skipped_files: Vec<FileId>,
    /// 既に別の同期が走っていたため何もしなかった
    pub already_running: bool,
}

impl SyncReport {
    pub fn already_running() -> Self {
        Self {
            already_running: true,
            ..Self::default()
        }
    }
}

use crate::domain::value_objects::offline::{
    EditId, EditPayload, EditSyncStatus, EditType, FileId, FileType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ローカルに保持されたリモート未反映の編集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEdit {
    /// 挿入順の連番。同一タイムスタンプ時の並び順に使う。
    pub record_id: i64,
    pub id: EditId,
    pub file_id: FileId,
    pub file_type: FileType,
    pub edit_type: EditType,
    pub payload: EditPayload,
    pub timestamp: DateTime<Utc>,
    pub sync_status: EditSyncStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OfflineEdit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        record_id: i64,
        id: EditId,
        file_id: FileId,
        file_type: FileType,
        edit_type: EditType,
        payload: EditPayload,
        timestamp: DateTime<Utc>,
        sync_status: EditSyncStatus,
        retry_count: u32,
        error: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id,
            id,
            file_id,
            file_type,
            edit_type,
            payload,
            timestamp,
            sync_status,
            retry_count,
            error,
            updated_at,
        }
    }
}

/// 追加前の編集。種別とペイロードの整合性はここで検証する。
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineEditDraft {
    pub file_id: FileId,
    pub file_type: FileType,
    pub payload: EditPayload,
}

impl OfflineEditDraft {
    pub fn new(file_id: FileId, file_type: FileType, payload: EditPayload) -> Result<Self, String> {
        let edit_type = payload.edit_type();
        if !edit_type.applies_to(file_type) {
            return Err(format!(
                "{} edits cannot target a {}",
                edit_type.as_str(),
                file_type.as_str()
            ));
        }
        Ok(Self {
            file_id,
            file_type,
            payload,
        })
    }

    pub fn edit_type(&self) -> EditType {
        self.payload.edit_type()
    }
}

/// ステータス別件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditCounts {
    pub total: u64,
    pub pending: u64,
    pub syncing: u64,
    pub synced: u64,
    pub failed: u64,
}

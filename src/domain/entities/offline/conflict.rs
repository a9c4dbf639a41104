use crate::domain::value_objects::offline::{EditId, FileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// リモートとローカル編集の食い違いの記録。解消されるまで該当ファイルの自動反映を止める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConflict {
    pub file_id: FileId,
    pub edit_id: EditId,
    pub message: String,
    pub remote_version: Option<i64>,
    pub detected_at: DateTime<Utc>,
}

/// ユーザーが選ぶ解消方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// ローカルの編集をリモートの最新版に上書きする
    KeepLocal,
    /// ローカルの編集を破棄してリモート版を採用する
    DiscardLocal,
}

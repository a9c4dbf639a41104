use crate::domain::entities::offline::FileItem;
use crate::domain::value_objects::offline::{CellRef, FileId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// ダウンロード進捗（0–100）の通知先
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote version changed: {message}")]
    Conflict {
        message: String,
        remote_version: Option<i64>,
    },

    #[error("Transient remote failure: {0}")]
    Transient(String),

    #[error("Remote request timed out")]
    Timeout,

    #[error("Remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// バックオフ付きで再試行すべき失敗か
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Timeout)
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Conflict { .. } => AppError::Conflict(err.to_string()),
            other => AppError::Network(other.to_string()),
        }
    }
}

/// リモート反映の応答。サーバーが採番した新しい版を返す場合がある。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteAck {
    pub version: Option<i64>,
}

impl RemoteAck {
    pub fn versioned(version: i64) -> Self {
        Self {
            version: Some(version),
        }
    }
}

/// リモートのドキュメント／スプレッドシート API。
///
/// `base_version` はローカル編集の元になった版。サーバー側で版が進んでいれば
/// `RemoteError::Conflict` を返すこと。
#[async_trait]
pub trait RemoteDocumentApi: Send + Sync {
    async fn save_content(
        &self,
        file_id: &FileId,
        content: &str,
        base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError>;

    async fn update_title(
        &self,
        file_id: &FileId,
        title: &str,
        base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError>;

    async fn update_cell(
        &self,
        file_id: &FileId,
        cell_ref: &CellRef,
        value: &Value,
        formula: Option<&str>,
    ) -> Result<RemoteAck, RemoteError>;
}

/// オフライン保存用のファイル取得元
#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    async fn fetch(&self, file: &FileItem, on_progress: ProgressCallback)
        -> Result<Bytes, RemoteError>;

    async fn starred_files(&self) -> Result<Vec<FileItem>, RemoteError>;

    async fn recent_files(&self, limit: u32) -> Result<Vec<FileItem>, RemoteError>;
}

use crate::domain::entities::offline::{EditCounts, FileConflict, OfflineEdit, OfflineEditDraft};
use crate::domain::value_objects::offline::{EditId, FileId, FileType};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// オフライン編集の永続化ポート。
///
/// 永続化エラーはそのまま呼び出し元へ返す。再試行は同期エンジン側の責務。
#[async_trait]
pub trait LocalEditStore: Send + Sync {
    /// 編集を `pending` として保存
    async fn append(&self, draft: OfflineEditDraft) -> Result<OfflineEdit, AppError>;

    /// 複数の編集を一括で保存する。どれか一つでも入らなければ何も保存しない。
    async fn append_batch(
        &self,
        drafts: Vec<OfflineEditDraft>,
    ) -> Result<Vec<OfflineEdit>, AppError>;

    async fn get(&self, id: &EditId) -> Result<Option<OfflineEdit>, AppError>;

    /// 未同期の編集を作成順で取得
    async fn list_pending(&self, file_id: Option<&FileId>) -> Result<Vec<OfflineEdit>, AppError>;

    /// 同期済みを含む全編集を作成順で取得
    async fn list_all(&self, file_id: Option<&FileId>) -> Result<Vec<OfflineEdit>, AppError>;

    /// 未同期の編集を持つファイル（最古の編集順）
    async fn pending_file_ids(&self) -> Result<Vec<FileId>, AppError>;

    async fn counts(&self) -> Result<EditCounts, AppError>;

    /// `syncing` へ遷移。同じファイルの別編集が `syncing` なら何もせず `false`。
    async fn mark_syncing(&self, id: &EditId) -> Result<bool, AppError>;

    async fn mark_synced(&self, id: &EditId) -> Result<(), AppError>;

    /// 試行回数を加算して `failed` へ
    async fn mark_failed(&self, id: &EditId, error: &str) -> Result<(), AppError>;

    /// 試行回数を加算して `pending` へ戻す。加算後の試行回数を返す。
    async fn requeue(&self, id: &EditId, error: &str) -> Result<u32, AppError>;

    /// 試行回数を消費せず `pending` へ戻す
    async fn release(&self, id: &EditId) -> Result<(), AppError>;

    /// `failed` の編集を試行回数 0 の `pending` に戻す
    async fn reset_failed(&self, file_id: Option<&FileId>) -> Result<u64, AppError>;

    /// 中断された `syncing` を `pending` に戻す（起動時）
    async fn recover_in_flight(&self) -> Result<u64, AppError>;

    /// ファイルの編集をすべて削除
    async fn clear(&self, file_id: &FileId) -> Result<u64, AppError>;

    async fn prune_synced(&self, file_id: Option<&FileId>) -> Result<u64, AppError>;

    async fn record_conflict(&self, conflict: &FileConflict) -> Result<(), AppError>;

    async fn get_conflict(&self, file_id: &FileId) -> Result<Option<FileConflict>, AppError>;

    async fn list_conflicts(&self) -> Result<Vec<FileConflict>, AppError>;

    async fn clear_conflict(&self, file_id: &FileId) -> Result<bool, AppError>;
}

/// エディタが最後に保存したローカル作業コピー
#[async_trait]
pub trait WorkingCopyStore: Send + Sync {
    async fn save_working_copy(
        &self,
        file_id: &FileId,
        kind: FileType,
        body: &str,
    ) -> Result<(), AppError>;

    async fn load_working_copy(
        &self,
        file_id: &FileId,
        kind: FileType,
    ) -> Result<Option<String>, AppError>;

    async fn delete_working_copies(&self, file_id: &FileId) -> Result<u64, AppError>;
}

use crate::application::ports::edit_store::{LocalEditStore, WorkingCopyStore};
use crate::application::services::offline_file_cache::OfflineFileCache;
use crate::application::services::sync_service::SyncService;
use crate::domain::entities::offline::{
    ConflictResolution, FileConflict, OfflineEdit, OfflineEditDraft, SyncReport,
};
use crate::domain::value_objects::offline::{CellRef, EditPayload, EditType, FileId, FileType};
use crate::shared::error::AppError;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// UI から呼ばれるオフライン編集の窓口。
///
/// 保存はローカルに記録して即座に戻り、リモートへの反映は `SyncService` が行う。
pub struct OfflineEditingService {
    edits: Arc<dyn LocalEditStore>,
    working_copies: Arc<dyn WorkingCopyStore>,
    cache: Arc<OfflineFileCache>,
    sync: Arc<SyncService>,
}

impl OfflineEditingService {
    pub fn new(
        edits: Arc<dyn LocalEditStore>,
        working_copies: Arc<dyn WorkingCopyStore>,
        cache: Arc<OfflineFileCache>,
        sync: Arc<SyncService>,
    ) -> Self {
        Self {
            edits,
            working_copies,
            cache,
            sync,
        }
    }

    /// 本文（と任意でタイトル）をオフライン保存する
    pub async fn save_document_offline(
        &self,
        file_id: &FileId,
        content: &str,
        title: Option<&str>,
    ) -> Result<Vec<OfflineEdit>, AppError> {
        let mut drafts = vec![document_draft(file_id, EditPayload::content(content))?];
        if let Some(title) = title {
            drafts.push(document_draft(file_id, EditPayload::title(title))?);
        }

        let saved = self.edits.append_batch(drafts).await?;
        self.working_copies
            .save_working_copy(file_id, FileType::Document, content)
            .await?;
        self.cache.mark_modified(file_id).await?;

        info!(
            target: "offline::edits",
            %file_id,
            edits = saved.len(),
            "Document saved offline"
        );
        self.sync.publish_queue().await;
        Ok(saved)
    }

    /// セルの値（と任意で数式）をオフライン保存する
    pub async fn save_spreadsheet_cell_offline(
        &self,
        file_id: &FileId,
        cell_ref: &str,
        value: Value,
        formula: Option<String>,
    ) -> Result<OfflineEdit, AppError> {
        let cell_ref = CellRef::new(cell_ref.to_string()).map_err(AppError::ValidationError)?;
        let draft = OfflineEditDraft::new(
            file_id.clone(),
            FileType::Spreadsheet,
            EditPayload::cell(cell_ref.clone(), value, formula),
        )
        .map_err(AppError::ValidationError)?;

        let edit = self.edits.append(draft).await?;
        self.cache.mark_modified(file_id).await?;

        debug!(target: "offline::edits", %file_id, cell = %cell_ref, "Cell saved offline");
        self.sync.publish_queue().await;
        Ok(edit)
    }

    /// スプレッドシート全体の基準データを保存する。以降のセル編集はこの上に重ねる。
    pub async fn save_spreadsheet_offline(
        &self,
        file_id: &FileId,
        data: &Value,
    ) -> Result<(), AppError> {
        if !data.is_object() {
            return Err(AppError::ValidationError(
                "Spreadsheet data must be a JSON object".to_string(),
            ));
        }
        let body = serde_json::to_string(data)?;
        self.working_copies
            .save_working_copy(file_id, FileType::Spreadsheet, &body)
            .await
    }

    /// 最新の未同期本文、作業コピー、キャッシュ済みファイルの順に探す
    pub async fn get_offline_document_content(
        &self,
        file_id: &FileId,
    ) -> Result<Option<String>, AppError> {
        let pending = self.edits.list_pending(Some(file_id)).await?;
        let latest = pending.iter().rev().find_map(|edit| match &edit.payload {
            EditPayload::Content { content } => Some(content.clone()),
            _ => None,
        });
        if latest.is_some() {
            return Ok(latest);
        }

        if let Some(body) = self
            .working_copies
            .load_working_copy(file_id, FileType::Document)
            .await?
        {
            return Ok(Some(body));
        }

        let Some(bytes) = self.cache.read_bytes(file_id).await? else {
            return Ok(None);
        };
        self.cache.mark_accessed(file_id).await?;
        Ok(String::from_utf8(bytes).ok())
    }

    /// 基準データに未同期のセル編集を作成順に重ねた結果
    pub async fn get_offline_spreadsheet_data(
        &self,
        file_id: &FileId,
    ) -> Result<Option<Value>, AppError> {
        let base = match self
            .working_copies
            .load_working_copy(file_id, FileType::Spreadsheet)
            .await?
        {
            Some(body) => Some(serde_json::from_str::<Value>(&body)?),
            None => match self.cache.read_bytes(file_id).await? {
                Some(bytes) => serde_json::from_slice::<Value>(&bytes).ok(),
                None => None,
            },
        };

        let cell_edits: Vec<OfflineEdit> = self
            .edits
            .list_pending(Some(file_id))
            .await?
            .into_iter()
            .filter(|edit| matches!(edit.edit_type, EditType::Cell | EditType::Formula))
            .collect();

        if base.is_none() && cell_edits.is_empty() {
            return Ok(None);
        }

        let mut data = base.unwrap_or_else(|| json!({}));
        for edit in &cell_edits {
            if let EditPayload::Cell {
                cell_ref,
                value,
                formula,
            } = &edit.payload
            {
                apply_cell(&mut data, cell_ref, value, formula.as_deref());
            }
        }
        Ok(Some(data))
    }

    pub async fn sync_pending_edits(&self) -> Result<SyncReport, AppError> {
        self.sync.sync_pending().await
    }

    /// ファイルのローカル編集を捨てる。キャッシュ済みの内容はリモート版のまま。
    pub async fn clear_offline_edits(&self, file_id: &FileId) -> Result<u64, AppError> {
        let removed = self.edits.clear(file_id).await?;
        self.working_copies.delete_working_copies(file_id).await?;
        self.cache.mark_synced(file_id).await?;

        info!(target: "offline::edits", %file_id, removed, "Cleared offline edits");
        self.sync.publish_queue().await;
        Ok(removed)
    }

    pub async fn is_file_available_for_offline_editing(
        &self,
        file_id: &FileId,
    ) -> Result<bool, AppError> {
        self.cache.is_available(file_id).await
    }

    pub async fn pending_edits(
        &self,
        file_id: Option<&FileId>,
    ) -> Result<Vec<OfflineEdit>, AppError> {
        self.edits.list_pending(file_id).await
    }

    /// 同期済みも含めた編集履歴（保持設定が有効な場合のみ残る）
    pub async fn edit_history(
        &self,
        file_id: Option<&FileId>,
    ) -> Result<Vec<OfflineEdit>, AppError> {
        self.edits.list_all(file_id).await
    }

    pub async fn conflicts(&self) -> Result<Vec<FileConflict>, AppError> {
        self.sync.conflicts().await
    }

    pub async fn resolve_conflict(
        &self,
        file_id: &FileId,
        resolution: ConflictResolution,
    ) -> Result<SyncReport, AppError> {
        let report = self.sync.resolve_conflict(file_id, resolution).await?;
        if resolution == ConflictResolution::DiscardLocal {
            self.working_copies.delete_working_copies(file_id).await?;
        }
        Ok(report)
    }
}

fn document_draft(file_id: &FileId, payload: EditPayload) -> Result<OfflineEditDraft, AppError> {
    OfflineEditDraft::new(file_id.clone(), FileType::Document, payload)
        .map_err(AppError::ValidationError)
}

/// `{"cells": {"A1": {"value": .., "formula": ..}}}` 形式で 1 セルを書き込む
fn apply_cell(data: &mut Value, cell_ref: &CellRef, value: &Value, formula: Option<&str>) {
    if !data.is_object() {
        *data = json!({});
    }
    let Some(root) = data.as_object_mut() else {
        return;
    };
    let cells = root
        .entry("cells")
        .or_insert_with(|| Value::Object(Map::new()));
    if !cells.is_object() {
        *cells = Value::Object(Map::new());
    }
    let Some(cells) = cells.as_object_mut() else {
        return;
    };

    let mut cell = Map::new();
    cell.insert("value".to_string(), value.clone());
    if let Some(formula) = formula {
        cell.insert("formula".to_string(), Value::String(formula.to_string()));
    }
    cells.insert(cell_ref.as_str().to_string(), Value::Object(cell));
}

use super::mappers::{file_conflict_from_row, offline_edit_from_row};
use super::queries::{
    COUNT_QUEUE_EDITS, DELETE_CONFLICT, DELETE_EDITS_FOR_FILE, DELETE_SYNCED_EDITS,
    DELETE_SYNCED_EDITS_FOR_FILE, DELETE_WORKING_COPIES, INSERT_EDIT, RECOVER_IN_FLIGHT_EDITS,
    RESET_FAILED_EDITS, RESET_FAILED_EDITS_FOR_FILE, SELECT_ALL_EDITS, SELECT_ALL_EDITS_FOR_FILE,
    SELECT_CONFLICT, SELECT_CONFLICTS, SELECT_EDIT_BY_ID, SELECT_EDIT_COUNTS, SELECT_EDIT_STATUS,
    SELECT_PENDING_EDITS, SELECT_PENDING_EDITS_FOR_FILE, SELECT_PENDING_FILE_IDS,
    SELECT_WORKING_COPY, UPDATE_EDIT_FAILED, UPDATE_EDIT_RELEASE, UPDATE_EDIT_REQUEUE,
    UPDATE_EDIT_SYNCED, UPDATE_EDIT_SYNCING, UPSERT_CONFLICT, UPSERT_WORKING_COPY,
};
use super::rows::{FileConflictRow, OfflineEditRow};
use crate::application::ports::edit_store::{LocalEditStore, WorkingCopyStore};
use crate::domain::entities::offline::{EditCounts, FileConflict, OfflineEdit, OfflineEditDraft};
use crate::domain::value_objects::offline::{EditId, EditSyncStatus, FileId, FileType};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// SQLite 上のオフライン編集ストア
#[derive(Clone)]
pub struct SqliteEditStore {
    pool: ConnectionPool,
    max_queue_size: u32,
}

impl SqliteEditStore {
    pub fn new(pool: ConnectionPool, max_queue_size: u32) -> Self {
        Self {
            pool,
            max_queue_size: max_queue_size.max(1),
        }
    }

    async fn current_status(&self, id: &EditId) -> Result<Option<(String, String)>, AppError> {
        let row: Option<(String, String)> = sqlx::query_as(SELECT_EDIT_STATUS)
            .bind(id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(row)
    }

    async fn ensure_exists(&self, id: &EditId) -> Result<EditSyncStatus, AppError> {
        match self.current_status(id).await? {
            Some((_, status)) => Ok(EditSyncStatus::from(status.as_str())),
            None => Err(AppError::NotFound(format!("Offline edit {id} not found"))),
        }
    }

    async fn fetch_edits(
        &self,
        query: &'static str,
        file_id: Option<&FileId>,
    ) -> Result<Vec<OfflineEdit>, AppError> {
        let mut builder = sqlx::query_as::<_, OfflineEditRow>(query);
        if let Some(file_id) = file_id {
            builder = builder.bind(file_id.as_str());
        }
        let rows = builder.fetch_all(self.pool.get_pool()).await?;
        rows.into_iter().map(offline_edit_from_row).collect()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl LocalEditStore for SqliteEditStore {
    async fn append(&self, draft: OfflineEditDraft) -> Result<OfflineEdit, AppError> {
        self.append_batch(vec![draft])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("Append produced no edit".to_string()))
    }

    async fn append_batch(
        &self,
        drafts: Vec<OfflineEditDraft>,
    ) -> Result<Vec<OfflineEdit>, AppError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let mut encoded = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let payload = draft
                .payload
                .to_json_string()
                .map_err(AppError::SerializationError)?;
            encoded.push((draft, payload));
        }
        let incoming = encoded.len() as i64;

        let mut tx = self.pool.get_pool().begin().await?;

        let (total, unsynced): (i64, i64) = sqlx::query_as(COUNT_QUEUE_EDITS)
            .fetch_one(&mut *tx)
            .await?;
        let limit = i64::from(self.max_queue_size);
        if unsynced + incoming > limit {
            return Err(AppError::ValidationError(format!(
                "Offline edit queue is full ({} unsynced edits). Sync before making more changes.",
                unsynced
            )));
        }

        // 同期済みの履歴から先に削る
        if total + incoming > limit {
            let pruned = sqlx::query(DELETE_SYNCED_EDITS)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!(target: "offline::store", pruned, "Pruned synced edits before append");
        }

        let mut appended = Vec::with_capacity(encoded.len());
        for (draft, payload) in encoded {
            let id = EditId::generate();
            let edit_type = draft.edit_type();
            let created_at = Utc::now();
            let created_ms = created_at.timestamp_millis();

            let record_id = sqlx::query(INSERT_EDIT)
                .bind(id.as_str())
                .bind(draft.file_id.as_str())
                .bind(draft.file_type.as_str())
                .bind(edit_type.as_str())
                .bind(&payload)
                .bind(created_ms)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            let created_at =
                DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or(created_at);
            appended.push(OfflineEdit::new(
                record_id,
                id,
                draft.file_id,
                draft.file_type,
                edit_type,
                draft.payload,
                created_at,
                EditSyncStatus::Pending,
                0,
                None,
                created_at,
            ));
        }

        tx.commit().await?;
        Ok(appended)
    }

    async fn get(&self, id: &EditId) -> Result<Option<OfflineEdit>, AppError> {
        let row = sqlx::query_as::<_, OfflineEditRow>(SELECT_EDIT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        row.map(offline_edit_from_row).transpose()
    }

    async fn list_pending(&self, file_id: Option<&FileId>) -> Result<Vec<OfflineEdit>, AppError> {
        match file_id {
            Some(_) => self.fetch_edits(SELECT_PENDING_EDITS_FOR_FILE, file_id).await,
            None => self.fetch_edits(SELECT_PENDING_EDITS, None).await,
        }
    }

    async fn list_all(&self, file_id: Option<&FileId>) -> Result<Vec<OfflineEdit>, AppError> {
        match file_id {
            Some(_) => self.fetch_edits(SELECT_ALL_EDITS_FOR_FILE, file_id).await,
            None => self.fetch_edits(SELECT_ALL_EDITS, None).await,
        }
    }

    async fn pending_file_ids(&self) -> Result<Vec<FileId>, AppError> {
        let ids: Vec<String> = sqlx::query_scalar(SELECT_PENDING_FILE_IDS)
            .fetch_all(self.pool.get_pool())
            .await?;
        ids.into_iter()
            .map(|id| FileId::new(id).map_err(AppError::DeserializationError))
            .collect()
    }

    async fn counts(&self) -> Result<EditCounts, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(SELECT_EDIT_COUNTS)
            .fetch_all(self.pool.get_pool())
            .await?;

        let mut counts = EditCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            counts.total += count;
            match EditSyncStatus::from(status.as_str()) {
                EditSyncStatus::Pending => counts.pending += count,
                EditSyncStatus::Syncing => counts.syncing += count,
                EditSyncStatus::Synced => counts.synced += count,
                EditSyncStatus::Failed => counts.failed += count,
                EditSyncStatus::Unknown(_) => {}
            }
        }
        Ok(counts)
    }

    async fn mark_syncing(&self, id: &EditId) -> Result<bool, AppError> {
        let result = sqlx::query(UPDATE_EDIT_SYNCING)
            .bind(id.as_str())
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => return Ok(true),
            Ok(_) => {}
            // 部分ユニークインデックスが並行遷移を弾いた場合
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => return Ok(false),
            Err(err) => return Err(err.into()),
        }

        Ok(self.ensure_exists(id).await? == EditSyncStatus::Syncing)
    }

    async fn mark_synced(&self, id: &EditId) -> Result<(), AppError> {
        let affected = sqlx::query(UPDATE_EDIT_SYNCED)
            .bind(id.as_str())
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::NotFound(format!("Offline edit {id} not found")));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &EditId, error: &str) -> Result<(), AppError> {
        let affected = sqlx::query(UPDATE_EDIT_FAILED)
            .bind(id.as_str())
            .bind(error)
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        if affected == 0 {
            self.ensure_exists(id).await?;
        }
        Ok(())
    }

    async fn requeue(&self, id: &EditId, error: &str) -> Result<u32, AppError> {
        let retry_count: Option<i64> = sqlx::query_scalar(UPDATE_EDIT_REQUEUE)
            .bind(id.as_str())
            .bind(error)
            .bind(now_millis())
            .fetch_optional(self.pool.get_pool())
            .await?;

        match retry_count {
            Some(count) => Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX)),
            None => {
                self.ensure_exists(id).await?;
                Ok(self.get(id).await?.map(|edit| edit.retry_count).unwrap_or(0))
            }
        }
    }

    async fn release(&self, id: &EditId) -> Result<(), AppError> {
        let affected = sqlx::query(UPDATE_EDIT_RELEASE)
            .bind(id.as_str())
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        if affected == 0 {
            self.ensure_exists(id).await?;
        }
        Ok(())
    }

    async fn reset_failed(&self, file_id: Option<&FileId>) -> Result<u64, AppError> {
        let query = match file_id {
            Some(file_id) => sqlx::query(RESET_FAILED_EDITS_FOR_FILE)
                .bind(now_millis())
                .bind(file_id.as_str()),
            None => sqlx::query(RESET_FAILED_EDITS).bind(now_millis()),
        };
        Ok(query.execute(self.pool.get_pool()).await?.rows_affected())
    }

    async fn recover_in_flight(&self) -> Result<u64, AppError> {
        let recovered = sqlx::query(RECOVER_IN_FLIGHT_EDITS)
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        if recovered > 0 {
            info!(target: "offline::store", recovered, "Returned interrupted edits to pending");
        }
        Ok(recovered)
    }

    async fn clear(&self, file_id: &FileId) -> Result<u64, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        let removed = sqlx::query(DELETE_EDITS_FOR_FILE)
            .bind(file_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(DELETE_CONFLICT)
            .bind(file_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn prune_synced(&self, file_id: Option<&FileId>) -> Result<u64, AppError> {
        let query = match file_id {
            Some(file_id) => sqlx::query(DELETE_SYNCED_EDITS_FOR_FILE).bind(file_id.as_str()),
            None => sqlx::query(DELETE_SYNCED_EDITS),
        };
        Ok(query.execute(self.pool.get_pool()).await?.rows_affected())
    }

    async fn record_conflict(&self, conflict: &FileConflict) -> Result<(), AppError> {
        sqlx::query(UPSERT_CONFLICT)
            .bind(conflict.file_id.as_str())
            .bind(conflict.edit_id.as_str())
            .bind(&conflict.message)
            .bind(conflict.remote_version)
            .bind(conflict.detected_at.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn get_conflict(&self, file_id: &FileId) -> Result<Option<FileConflict>, AppError> {
        let row = sqlx::query_as::<_, FileConflictRow>(SELECT_CONFLICT)
            .bind(file_id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        row.map(file_conflict_from_row).transpose()
    }

    async fn list_conflicts(&self) -> Result<Vec<FileConflict>, AppError> {
        let rows = sqlx::query_as::<_, FileConflictRow>(SELECT_CONFLICTS)
            .fetch_all(self.pool.get_pool())
            .await?;
        rows.into_iter().map(file_conflict_from_row).collect()
    }

    async fn clear_conflict(&self, file_id: &FileId) -> Result<bool, AppError> {
        let affected = sqlx::query(DELETE_CONFLICT)
            .bind(file_id.as_str())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}

#[async_trait]
impl WorkingCopyStore for SqliteEditStore {
    async fn save_working_copy(
        &self,
        file_id: &FileId,
        kind: FileType,
        body: &str,
    ) -> Result<(), AppError> {
        sqlx::query(UPSERT_WORKING_COPY)
            .bind(file_id.as_str())
            .bind(kind.as_str())
            .bind(body)
            .bind(now_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn load_working_copy(
        &self,
        file_id: &FileId,
        kind: FileType,
    ) -> Result<Option<String>, AppError> {
        let body: Option<String> = sqlx::query_scalar(SELECT_WORKING_COPY)
            .bind(file_id.as_str())
            .bind(kind.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(body)
    }

    async fn delete_working_copies(&self, file_id: &FileId) -> Result<u64, AppError> {
        let removed = sqlx::query(DELETE_WORKING_COPIES)
            .bind(file_id.as_str())
            .execute(self.pool.get_pool())
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::offline::{CellRef, EditPayload};
    use serde_json::json;

    async fn setup_store(max_queue_size: u32) -> SqliteEditStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        SqliteEditStore::new(pool, max_queue_size)
    }

    fn file(id: &str) -> FileId {
        FileId::new(id.to_string()).unwrap()
    }

    fn content_draft(file_id: &str, content: &str) -> OfflineEditDraft {
        OfflineEditDraft::new(file(file_id), FileType::Document, EditPayload::content(content))
            .unwrap()
    }

    #[tokio::test]
    async fn append_persists_pending_edit() {
        let store = setup_store(10).await;

        let edit = store.append(content_draft("doc-1", "Hello")).await.unwrap();
        assert_eq!(edit.sync_status, EditSyncStatus::Pending);
        assert_eq!(edit.retry_count, 0);

        let loaded = store.get(&edit.id).await.unwrap().unwrap();
        assert_eq!(loaded, edit);
    }

    #[tokio::test]
    async fn list_pending_orders_by_creation_and_filters_by_file() {
        let store = setup_store(10).await;
        let first = store.append(content_draft("doc-1", "a")).await.unwrap();
        let other = store.append(content_draft("doc-2", "x")).await.unwrap();
        let second = store.append(content_draft("doc-1", "b")).await.unwrap();

        let all: Vec<_> = store
            .list_pending(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(all, vec![first.id.clone(), other.id.clone(), second.id.clone()]);

        let doc1: Vec<_> = store
            .list_pending(Some(&file("doc-1")))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(doc1, vec![first.id.clone(), second.id]);

        store.mark_syncing(&first.id).await.unwrap();
        store.mark_synced(&first.id).await.unwrap();
        assert_eq!(store.list_pending(Some(&file("doc-1"))).await.unwrap().len(), 1);
        assert_eq!(
            store.pending_file_ids().await.unwrap(),
            vec![file("doc-2"), file("doc-1")]
        );
    }

    #[tokio::test]
    async fn mark_syncing_serializes_per_file() {
        let store = setup_store(10).await;
        let first = store.append(content_draft("doc-1", "a")).await.unwrap();
        let second = store.append(content_draft("doc-1", "b")).await.unwrap();
        let other = store.append(content_draft("doc-2", "c")).await.unwrap();

        assert!(store.mark_syncing(&first.id).await.unwrap());
        // 冪等
        assert!(store.mark_syncing(&first.id).await.unwrap());
        assert!(!store.mark_syncing(&second.id).await.unwrap());
        assert!(store.mark_syncing(&other.id).await.unwrap());

        store.mark_synced(&first.id).await.unwrap();
        assert!(store.mark_syncing(&second.id).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_and_fail_count_attempts_once_per_flight() {
        let store = setup_store(10).await;
        let edit = store.append(content_draft("doc-1", "a")).await.unwrap();

        store.mark_syncing(&edit.id).await.unwrap();
        assert_eq!(store.requeue(&edit.id, "timeout").await.unwrap(), 1);
        // syncing でない状態からの再投入は試行回数を増やさない
        assert_eq!(store.requeue(&edit.id, "timeout").await.unwrap(), 1);

        store.mark_syncing(&edit.id).await.unwrap();
        store.mark_failed(&edit.id, "boom").await.unwrap();
        store.mark_failed(&edit.id, "boom").await.unwrap();

        let failed = store.get(&edit.id).await.unwrap().unwrap();
        assert_eq!(failed.sync_status, EditSyncStatus::Failed);
        assert_eq!(failed.retry_count, 2);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        assert_eq!(store.reset_failed(None).await.unwrap(), 1);
        let reset = store.get(&edit.id).await.unwrap().unwrap();
        assert_eq!(reset.sync_status, EditSyncStatus::Pending);
        assert_eq!(reset.retry_count, 0);
    }

    #[tokio::test]
    async fn release_keeps_retry_budget() {
        let store = setup_store(10).await;
        let edit = store.append(content_draft("doc-1", "a")).await.unwrap();
        store.mark_syncing(&edit.id).await.unwrap();
        store.release(&edit.id).await.unwrap();

        let released = store.get(&edit.id).await.unwrap().unwrap();
        assert_eq!(released.sync_status, EditSyncStatus::Pending);
        assert_eq!(released.retry_count, 0);
    }

    #[tokio::test]
    async fn transitions_on_unknown_edit_are_not_found() {
        let store = setup_store(10).await;
        let missing = EditId::generate();
        assert!(matches!(
            store.mark_synced(&missing).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_syncing(&missing).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recover_in_flight_returns_syncing_to_pending() {
        let store = setup_store(10).await;
        let edit = store.append(content_draft("doc-1", "a")).await.unwrap();
        store.mark_syncing(&edit.id).await.unwrap();

        assert_eq!(store.recover_in_flight().await.unwrap(), 1);
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.syncing, 0);
    }

    #[tokio::test]
    async fn full_queue_prunes_synced_then_rejects() {
        let store = setup_store(2).await;
        let first = store.append(content_draft("doc-1", "a")).await.unwrap();
        store.append(content_draft("doc-1", "b")).await.unwrap();

        let err = store.append(content_draft("doc-1", "c")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        store.mark_syncing(&first.id).await.unwrap();
        store.mark_synced(&first.id).await.unwrap();
        store.append(content_draft("doc-1", "c")).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.synced, 0);
        assert!(store.get(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_append_is_rejected_as_a_whole() {
        let store = setup_store(2).await;
        store.append(content_draft("doc-1", "a")).await.unwrap();

        let title = OfflineEditDraft::new(file("doc-2"), FileType::Document, EditPayload::title("T"))
            .unwrap();
        let err = store
            .append_batch(vec![content_draft("doc-2", "b"), title.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(store.list_pending(Some(&file("doc-2"))).await.unwrap().is_empty());

        let store = setup_store(3).await;
        let saved = store
            .append_batch(vec![content_draft("doc-2", "b"), title])
            .await
            .unwrap();
        let pending: Vec<_> = store
            .list_pending(Some(&file("doc-2")))
            .await
            .unwrap()
            .into_iter()
            .map(|edit| edit.id)
            .collect();
        assert_eq!(pending, saved.into_iter().map(|edit| edit.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn clear_removes_edits_and_conflict_for_file() {
        let store = setup_store(10).await;
        let edit = store.append(content_draft("doc-1", "a")).await.unwrap();
        store.append(content_draft("doc-2", "b")).await.unwrap();
        store
            .record_conflict(&FileConflict {
                file_id: file("doc-1"),
                edit_id: edit.id.clone(),
                message: "version 4 on server".into(),
                remote_version: Some(4),
                detected_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.list_conflicts().await.unwrap().len(), 1);

        assert_eq!(store.clear(&file("doc-1")).await.unwrap(), 1);
        assert!(store.get_conflict(&file("doc-1")).await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn cell_edits_keep_formula_payload() {
        let store = setup_store(10).await;
        let draft = OfflineEditDraft::new(
            file("sheet-1"),
            FileType::Spreadsheet,
            EditPayload::cell(
                CellRef::new("C3".into()).unwrap(),
                json!(42),
                Some("=A1+B2".into()),
            ),
        )
        .unwrap();
        let edit = store.append(draft).await.unwrap();
        let loaded = store.get(&edit.id).await.unwrap().unwrap();
        assert_eq!(loaded.edit_type.as_str(), "formula");
        assert_eq!(loaded.payload, edit.payload);
    }

    #[tokio::test]
    async fn working_copies_are_keyed_by_kind() {
        let store = setup_store(10).await;
        let id = file("doc-1");
        store
            .save_working_copy(&id, FileType::Document, "draft 1")
            .await
            .unwrap();
        store
            .save_working_copy(&id, FileType::Document, "draft 2")
            .await
            .unwrap();

        assert_eq!(
            store
                .load_working_copy(&id, FileType::Document)
                .await
                .unwrap()
                .as_deref(),
            Some("draft 2")
        );
        assert!(store
            .load_working_copy(&id, FileType::Spreadsheet)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.delete_working_copies(&id).await.unwrap(), 1);
    }
}

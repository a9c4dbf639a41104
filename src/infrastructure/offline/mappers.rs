use super::rows::{FileConflictRow, FileUsageRow, OfflineEditRow, OfflineFileRow};
use crate::application::ports::file_store::CacheUsage;
use crate::domain::entities::offline::{FileConflict, OfflineEdit, OfflineFile};
use crate::domain::value_objects::offline::{
    EditId, EditPayload, EditSyncStatus, EditType, FileId, FileSyncStatus, FileType,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub fn offline_edit_from_row(row: OfflineEditRow) -> Result<OfflineEdit, AppError> {
    let payload =
        EditPayload::from_json_str(&row.payload).map_err(AppError::DeserializationError)?;
    let edit_type: EditType = row.edit_type.parse().map_err(AppError::DeserializationError)?;
    let file_type: FileType = row.file_type.parse().map_err(AppError::DeserializationError)?;

    Ok(OfflineEdit::new(
        row.id,
        EditId::new(row.edit_id).map_err(AppError::DeserializationError)?,
        FileId::new(row.file_id).map_err(AppError::DeserializationError)?,
        file_type,
        edit_type,
        payload,
        timestamp_to_datetime(row.created_at)?,
        EditSyncStatus::from(row.sync_status.as_str()),
        u32::try_from(row.retry_count.max(0)).unwrap_or(u32::MAX),
        row.error_message,
        timestamp_to_datetime(row.updated_at)?,
    ))
}

pub fn file_conflict_from_row(row: FileConflictRow) -> Result<FileConflict, AppError> {
    Ok(FileConflict {
        file_id: FileId::new(row.file_id).map_err(AppError::DeserializationError)?,
        edit_id: EditId::new(row.edit_id).map_err(AppError::DeserializationError)?,
        message: row.message,
        remote_version: row.remote_version,
        detected_at: timestamp_to_datetime(row.detected_at)?,
    })
}

pub fn offline_file_from_row(row: OfflineFileRow) -> Result<OfflineFile, AppError> {
    Ok(OfflineFile {
        file_id: FileId::new(row.file_id).map_err(AppError::DeserializationError)?,
        local_path: PathBuf::from(row.local_path),
        blob_hash: row.blob_hash,
        original_name: row.original_name,
        size: to_u64(row.size),
        mime_type: row.mime_type,
        sync_status: FileSyncStatus::from(row.sync_status.as_str()),
        remote_version: row.remote_version,
        is_starred: row.is_starred,
        parent_id: row.parent_id,
        last_modified: row.last_modified.map(timestamp_to_datetime).transpose()?,
        downloaded_at: timestamp_to_datetime(row.downloaded_at)?,
        accessed_at: timestamp_to_datetime(row.accessed_at)?,
    })
}

pub fn cache_usage_from_row(row: FileUsageRow) -> Result<CacheUsage, AppError> {
    Ok(CacheUsage {
        used_bytes: to_u64(row.used_bytes),
        file_count: to_u64(row.file_count),
        oldest_download: row.oldest_download.map(timestamp_to_datetime).transpose()?,
        newest_download: row.newest_download.map(timestamp_to_datetime).transpose()?,
    })
}

/// SQLite の INTEGER は符号付きのため、バイト数は i64 で保存する
pub fn size_to_db(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

pub fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .ok_or_else(|| AppError::DeserializationError(format!("Invalid timestamp: {ts}")))
}

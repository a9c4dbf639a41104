use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct OfflineEditRow {
    pub id: i64,
    pub edit_id: String,
    pub file_id: String,
    pub file_type: String,
    pub edit_type: String,
    pub payload: String,
    pub sync_status: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct FileConflictRow {
    pub file_id: String,
    pub edit_id: String,
    pub message: String,
    pub remote_version: Option<i64>,
    pub detected_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct OfflineFileRow {
    pub file_id: String,
    pub local_path: String,
    pub blob_hash: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: Option<String>,
    pub sync_status: String,
    pub remote_version: Option<i64>,
    pub is_starred: bool,
    pub parent_id: Option<String>,
    pub last_modified: Option<i64>,
    pub downloaded_at: i64,
    pub accessed_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct FileUsageRow {
    pub used_bytes: i64,
    pub file_count: i64,
    pub oldest_download: Option<i64>,
    pub newest_download: Option<i64>,
}

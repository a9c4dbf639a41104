pub(super) const SELECT_EDIT_BY_ID: &str = r#"
    SELECT id, edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    FROM offline_edits
    WHERE edit_id = ?1
"#;

pub(super) const SELECT_PENDING_EDITS: &str = r#"
    SELECT id, edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    FROM offline_edits
    WHERE sync_status != 'synced'
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const SELECT_PENDING_EDITS_FOR_FILE: &str = r#"
    SELECT id, edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    FROM offline_edits
    WHERE sync_status != 'synced' AND file_id = ?1
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const SELECT_ALL_EDITS: &str = r#"
    SELECT id, edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    FROM offline_edits
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const SELECT_ALL_EDITS_FOR_FILE: &str = r#"
    SELECT id, edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    FROM offline_edits
    WHERE file_id = ?1
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const INSERT_EDIT: &str = r#"
    INSERT INTO offline_edits (
        edit_id, file_id, file_type, edit_type, payload, sync_status,
        retry_count, error_message, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, NULL, ?6, ?6)
"#;

pub(super) const COUNT_QUEUE_EDITS: &str = r#"
    SELECT
        COUNT(*) AS total,
        COALESCE(SUM(CASE WHEN sync_status != 'synced' THEN 1 ELSE 0 END), 0) AS unsynced
    FROM offline_edits
"#;

pub(super) const DELETE_SYNCED_EDITS: &str = r#"
    DELETE FROM offline_edits WHERE sync_status = 'synced'
"#;

pub(super) const DELETE_SYNCED_EDITS_FOR_FILE: &str = r#"
    DELETE FROM offline_edits WHERE sync_status = 'synced' AND file_id = ?1
"#;

pub(super) const SELECT_EDIT_STATUS: &str = r#"
    SELECT file_id, sync_status FROM offline_edits WHERE edit_id = ?1
"#;

/// 同じファイルで他に syncing が無い場合のみ遷移させる
pub(super) const UPDATE_EDIT_SYNCING: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'syncing', updated_at = ?2
    WHERE edit_id = ?1
      AND sync_status IN ('pending', 'failed')
      AND NOT EXISTS (
          SELECT 1 FROM offline_edits other
          WHERE other.file_id = offline_edits.file_id
            AND other.sync_status = 'syncing'
            AND other.edit_id != ?1
      )
"#;

pub(super) const UPDATE_EDIT_SYNCED: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'synced',
        error_message = NULL,
        updated_at = ?2,
        synced_at = COALESCE(synced_at, ?2)
    WHERE edit_id = ?1
"#;

pub(super) const UPDATE_EDIT_FAILED: &str = r#"
    UPDATE offline_edits
    SET retry_count = retry_count + CASE WHEN sync_status = 'syncing' THEN 1 ELSE 0 END,
        sync_status = 'failed',
        error_message = ?2,
        updated_at = ?3
    WHERE edit_id = ?1 AND sync_status != 'synced'
"#;

pub(super) const UPDATE_EDIT_REQUEUE: &str = r#"
    UPDATE offline_edits
    SET retry_count = retry_count + CASE WHEN sync_status = 'syncing' THEN 1 ELSE 0 END,
        sync_status = 'pending',
        error_message = ?2,
        updated_at = ?3
    WHERE edit_id = ?1 AND sync_status != 'synced'
    RETURNING retry_count
"#;

pub(super) const UPDATE_EDIT_RELEASE: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'pending', updated_at = ?2
    WHERE edit_id = ?1 AND sync_status = 'syncing'
"#;

pub(super) const RESET_FAILED_EDITS: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'pending', retry_count = 0, updated_at = ?1
    WHERE sync_status = 'failed'
"#;

pub(super) const RESET_FAILED_EDITS_FOR_FILE: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'pending', retry_count = 0, updated_at = ?1
    WHERE sync_status = 'failed' AND file_id = ?2
"#;

pub(super) const RECOVER_IN_FLIGHT_EDITS: &str = r#"
    UPDATE offline_edits
    SET sync_status = 'pending', updated_at = ?1
    WHERE sync_status = 'syncing'
"#;

pub(super) const DELETE_EDITS_FOR_FILE: &str = r#"
    DELETE FROM offline_edits WHERE file_id = ?1
"#;

pub(super) const SELECT_PENDING_FILE_IDS: &str = r#"
    SELECT file_id
    FROM offline_edits
    WHERE sync_status != 'synced'
    GROUP BY file_id
    ORDER BY MIN(created_at), MIN(id)
"#;

pub(super) const SELECT_EDIT_COUNTS: &str = r#"
    SELECT sync_status, COUNT(*) AS count
    FROM offline_edits
    GROUP BY sync_status
"#;

pub(super) const UPSERT_CONFLICT: &str = r#"
    INSERT INTO offline_file_conflicts (file_id, edit_id, message, remote_version, detected_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(file_id) DO UPDATE SET
        edit_id = excluded.edit_id,
        message = excluded.message,
        remote_version = excluded.remote_version,
        detected_at = excluded.detected_at
"#;

pub(super) const SELECT_CONFLICT: &str = r#"
    SELECT file_id, edit_id, message, remote_version, detected_at
    FROM offline_file_conflicts
    WHERE file_id = ?1
"#;

pub(super) const SELECT_CONFLICTS: &str = r#"
    SELECT file_id, edit_id, message, remote_version, detected_at
    FROM offline_file_conflicts
    ORDER BY detected_at ASC
"#;

pub(super) const DELETE_CONFLICT: &str = r#"
    DELETE FROM offline_file_conflicts WHERE file_id = ?1
"#;

pub(super) const UPSERT_WORKING_COPY: &str = r#"
    INSERT INTO offline_working_copies (file_id, kind, body, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(file_id, kind) DO UPDATE SET
        body = excluded.body,
        updated_at = excluded.updated_at
"#;

pub(super) const SELECT_WORKING_COPY: &str = r#"
    SELECT body FROM offline_working_copies WHERE file_id = ?1 AND kind = ?2
"#;

pub(super) const DELETE_WORKING_COPIES: &str = r#"
    DELETE FROM offline_working_copies WHERE file_id = ?1
"#;

pub(super) const SELECT_FILE_BY_ID: &str = r#"
    SELECT file_id, local_path, blob_hash, original_name, size, mime_type, sync_status,
        remote_version, is_starred, parent_id, last_modified, downloaded_at, accessed_at
    FROM offline_files
    WHERE file_id = ?1
"#;

pub(super) const SELECT_FILES: &str = r#"
    SELECT file_id, local_path, blob_hash, original_name, size, mime_type, sync_status,
        remote_version, is_starred, parent_id, last_modified, downloaded_at, accessed_at
    FROM offline_files
    ORDER BY downloaded_at DESC
"#;

pub(super) const SELECT_FILES_BY_STATUS: &str = r#"
    SELECT file_id, local_path, blob_hash, original_name, size, mime_type, sync_status,
        remote_version, is_starred, parent_id, last_modified, downloaded_at, accessed_at
    FROM offline_files
    WHERE sync_status = ?1
    ORDER BY accessed_at DESC
"#;

pub(super) const SELECT_EVICTION_CANDIDATES: &str = r#"
    SELECT file_id, local_path, blob_hash, original_name, size, mime_type, sync_status,
        remote_version, is_starred, parent_id, last_modified, downloaded_at, accessed_at
    FROM offline_files
    WHERE sync_status = 'synced'
    ORDER BY accessed_at ASC, downloaded_at ASC
"#;

pub(super) const UPSERT_FILE: &str = r#"
    INSERT INTO offline_files (
        file_id, local_path, blob_hash, original_name, size, mime_type, sync_status,
        remote_version, is_starred, parent_id, last_modified, downloaded_at, accessed_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT(file_id) DO UPDATE SET
        local_path = excluded.local_path,
        blob_hash = excluded.blob_hash,
        original_name = excluded.original_name,
        size = excluded.size,
        mime_type = excluded.mime_type,
        sync_status = excluded.sync_status,
        remote_version = excluded.remote_version,
        is_starred = excluded.is_starred,
        parent_id = excluded.parent_id,
        last_modified = excluded.last_modified,
        downloaded_at = excluded.downloaded_at,
        accessed_at = excluded.accessed_at
"#;

pub(super) const UPDATE_FILE_ACCESSED: &str = r#"
    UPDATE offline_files SET accessed_at = ?2 WHERE file_id = ?1
"#;

pub(super) const UPDATE_FILE_SYNC_STATUS: &str = r#"
    UPDATE offline_files SET sync_status = ?2 WHERE file_id = ?1
"#;

pub(super) const REPLACE_FILE_SYNC_STATUS: &str = r#"
    UPDATE offline_files SET sync_status = ?3 WHERE file_id = ?1 AND sync_status = ?2
"#;

pub(super) const UPDATE_FILE_REMOTE_VERSION: &str = r#"
    UPDATE offline_files SET remote_version = ?2 WHERE file_id = ?1
"#;

pub(super) const DELETE_FILE: &str = r#"
    DELETE FROM offline_files WHERE file_id = ?1
"#;

pub(super) const DELETE_ALL_FILES: &str = r#"
    DELETE FROM offline_files
"#;

pub(super) const COUNT_FILES_BY_HASH: &str = r#"
    SELECT COUNT(*) FROM offline_files WHERE blob_hash = ?1
"#;

pub(super) const SELECT_FILE_HASHES: &str = r#"
    SELECT DISTINCT blob_hash FROM offline_files
"#;

pub(super) const SELECT_FILE_USAGE: &str = r#"
    SELECT
        COALESCE(SUM(size), 0) AS used_bytes,
        COUNT(*) AS file_count,
        MIN(downloaded_at) AS oldest_download,
        MAX(downloaded_at) AS newest_download
    FROM offline_files
"#;

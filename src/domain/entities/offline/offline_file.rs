use crate::domain::value_objects::offline::{FileId, FileSyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Folder,
}

/// リモートのファイル一覧から得られる記述子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub id: FileId,
    pub name: String,
    pub kind: FileKind,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_starred: bool,
    pub parent_id: Option<String>,
    pub version: Option<i64>,
}

impl FileItem {
    pub fn file(id: FileId, name: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            name: name.into(),
            kind: FileKind::File,
            size: Some(size),
            mime_type: None,
            updated_at: None,
            is_starred: false,
            parent_id: None,
            version: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn starred(mut self) -> Self {
        self.is_starred = true;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    pub fn size_or_zero(&self) -> u64 {
        self.size.unwrap_or(0)
    }
}

/// ローカルにキャッシュされたファイルとメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineFile {
    pub file_id: FileId,
    pub local_path: PathBuf,
    pub blob_hash: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub sync_status: FileSyncStatus,
    pub remote_version: Option<i64>,
    pub is_starred: bool,
    pub parent_id: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub downloaded_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl OfflineFile {
    /// ダウンロード完了直後のレコードを組み立てる
    pub fn downloaded(
        item: &FileItem,
        original_name: String,
        local_path: PathBuf,
        blob_hash: String,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            file_id: item.id.clone(),
            local_path,
            blob_hash,
            original_name,
            size,
            mime_type: item.mime_type.clone(),
            sync_status: FileSyncStatus::Synced,
            remote_version: item.version,
            is_starred: item.is_starred,
            parent_id: item.parent_id.clone(),
            last_modified: item.updated_at,
            downloaded_at: now,
            accessed_at: now,
        }
    }

    pub fn mark_accessed(&mut self, at: DateTime<Utc>) {
        self.accessed_at = at;
    }
}

/// 表示用: リモート記述子とオフライン状態の合成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineFileInfo {
    #[serde(flatten)]
    pub item: FileItem,
    pub is_offline_available: bool,
    pub offline_sync_status: Option<FileSyncStatus>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub is_downloading: bool,
}

impl OfflineFileInfo {
    pub fn new(item: FileItem, cached: Option<&OfflineFile>, is_downloading: bool) -> Self {
        Self {
            item,
            is_offline_available: cached.is_some(),
            offline_sync_status: cached.map(|file| file.sync_status.clone()),
            downloaded_at: cached.map(|file| file.downloaded_at),
            is_downloading,
        }
    }
}

/// ローカル保存用にファイル名から危険な文字を除く
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                sanitized.push('_');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => sanitized.push('_'),
            c if c.is_control() => sanitized.push('_'),
            c => sanitized.push(c),
        }
    }
    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// 編集単位の同期状態。`pending -> syncing -> (synced | failed)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSyncStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
    Unknown(String),
}

impl EditSyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EditSyncStatus::Pending => "pending",
            EditSyncStatus::Syncing => "syncing",
            EditSyncStatus::Synced => "synced",
            EditSyncStatus::Failed => "failed",
            EditSyncStatus::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_outstanding(&self) -> bool {
        !matches!(self, EditSyncStatus::Synced)
    }
}

impl fmt::Display for EditSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EditSyncStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => EditSyncStatus::Pending,
            "syncing" => EditSyncStatus::Syncing,
            "synced" => EditSyncStatus::Synced,
            "failed" => EditSyncStatus::Failed,
            other => EditSyncStatus::Unknown(other.to_string()),
        }
    }
}

/// キャッシュ済みファイルの同期状態
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncStatus {
    Synced,
    Modified,
    Conflict,
    Unknown(String),
}

impl FileSyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileSyncStatus::Synced => "synced",
            FileSyncStatus::Modified => "modified",
            FileSyncStatus::Conflict => "conflict",
            FileSyncStatus::Unknown(value) => value.as_str(),
        }
    }

    /// 退避（eviction）対象にできるか。未同期の変更を抱えるファイルは対象外。
    pub fn is_evictable(&self) -> bool {
        matches!(self, FileSyncStatus::Synced)
    }
}

impl fmt::Display for FileSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for FileSyncStatus {
    fn from(value: &str) -> Self {
        match value {
            "synced" => FileSyncStatus::Synced,
            "modified" => FileSyncStatus::Modified,
            "conflict" => FileSyncStatus::Conflict,
            other => FileSyncStatus::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_values_round_trip_through_as_str() {
        let status = EditSyncStatus::from("archived");
        assert_eq!(status, EditSyncStatus::Unknown("archived".into()));
        assert_eq!(status.as_str(), "archived");
        assert!(status.is_outstanding());
        assert!(!EditSyncStatus::Synced.is_outstanding());
    }

    #[test]
    fn only_synced_files_are_evictable() {
        assert!(FileSyncStatus::Synced.is_evictable());
        assert!(!FileSyncStatus::Modified.is_evictable());
        assert!(!FileSyncStatus::Conflict.is_evictable());
        assert!(!FileSyncStatus::from("weird").is_evictable());
    }
}

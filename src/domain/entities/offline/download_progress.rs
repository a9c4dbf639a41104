use crate::domain::value_objects::offline::{DownloadStatus, FileId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub file_id: FileId,
    pub file_name: String,
    pub progress: u8,
    pub status: DownloadStatus,
    pub error: Option<String>,
}

impl DownloadProgress {
    pub fn downloading(file_id: FileId, file_name: String, progress: u8) -> Self {
        Self {
            file_id,
            file_name,
            progress: progress.min(100),
            status: DownloadStatus::Downloading,
            error: None,
        }
    }

    pub fn finished(
        file_id: FileId,
        file_name: String,
        status: DownloadStatus,
        error: Option<String>,
    ) -> Self {
        let progress = if status == DownloadStatus::Completed {
            100
        } else {
            0
        };
        Self {
            file_id,
            file_name,
            progress,
            status,
            error,
        }
    }
}

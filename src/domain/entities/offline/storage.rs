use crate::domain::value_objects::offline::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStorageStats {
    pub used_size: u64,
    pub available_size: u64,
    pub total_size: u64,
    pub file_count: u64,
    pub oldest_file: Option<DateTime<Utc>>,
    pub newest_file: Option<DateTime<Utc>>,
}

/// 使用量がこの割合（%）を超えるダウンロードは拒否する
const STORAGE_CEILING_PERCENT: u128 = 90;

impl OfflineStorageStats {
    pub fn new(
        used_size: u64,
        total_size: u64,
        file_count: u64,
        oldest_file: Option<DateTime<Utc>>,
        newest_file: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            used_size,
            available_size: total_size.saturating_sub(used_size),
            total_size,
            file_count,
            oldest_file,
            newest_file,
        }
    }

    /// 使用率（%）。小数第 1 位で丸める。
    pub fn percent_used(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        let raw = self.used_size as f64 / self.total_size as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }

    /// `file_size` バイトを追加で保存できるか。空き容量と総容量の 90% の両方を見る。
    pub fn validate_download(&self, file_size: u64) -> StorageValidation {
        if file_size > self.available_size {
            return StorageValidation::denied(format!(
                "Insufficient storage space. Need {}, but only {} available.",
                format_file_size(file_size),
                format_file_size(self.available_size)
            ));
        }
        let projected = u128::from(self.used_size) + u128::from(file_size);
        if projected * 100 > u128::from(self.total_size) * STORAGE_CEILING_PERCENT {
            return StorageValidation::denied(
                "Download would exceed storage limit. Please free up some space first.",
            );
        }
        StorageValidation::allowed()
    }
}

/// ダウンロード前の容量チェック結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageValidation {
    pub can_download: bool,
    pub message: Option<String>,
}

impl StorageValidation {
    pub fn allowed() -> Self {
        Self {
            can_download: true,
            message: None,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            can_download: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub evicted: Vec<FileId>,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCategory {
    Images,
    Videos,
    Audio,
    Documents,
    Spreadsheets,
    Presentations,
    Other,
}

impl StorageCategory {
    pub const ALL: [StorageCategory; 7] = [
        StorageCategory::Images,
        StorageCategory::Videos,
        StorageCategory::Audio,
        StorageCategory::Documents,
        StorageCategory::Spreadsheets,
        StorageCategory::Presentations,
        StorageCategory::Other,
    ];

    pub fn from_mime_type(mime_type: Option<&str>) -> Self {
        let Some(mime) = mime_type else {
            return StorageCategory::Other;
        };
        if mime.starts_with("image/") {
            StorageCategory::Images
        } else if mime.starts_with("video/") {
            StorageCategory::Videos
        } else if mime.starts_with("audio/") {
            StorageCategory::Audio
        } else if mime.contains("spreadsheet") || mime.contains("excel") || mime == "text/csv" {
            StorageCategory::Spreadsheets
        } else if mime.contains("presentation") || mime.contains("powerpoint") {
            StorageCategory::Presentations
        } else if mime.contains("pdf")
            || mime.contains("document")
            || mime.contains("msword")
            || mime.starts_with("text/")
        {
            StorageCategory::Documents
        } else {
            StorageCategory::Other
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUsage {
    pub size: u64,
    pub count: u64,
}

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// 1024 進で表示用に整形する（小数 2 桁、末尾の 0 は落とす）
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{value:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn percent_used_rounds_to_one_decimal() {
        let stats = OfflineStorageStats::new(1, 3, 1, None, None);
        assert_eq!(stats.percent_used(), 33.3);
        assert_eq!(stats.available_size, 2);

        let empty = OfflineStorageStats::new(0, 0, 0, None, None);
        assert_eq!(empty.percent_used(), 0.0);
    }

    #[test]
    fn used_above_total_leaves_no_headroom() {
        let stats = OfflineStorageStats::new(12, 10, 2, None, None);
        assert_eq!(stats.available_size, 0);
    }

    #[test]
    fn insufficient_space_message_names_both_sizes() {
        let stats = OfflineStorageStats::new(0, 5 * MB, 0, None, None);
        let validation = stats.validate_download(10 * MB);

        assert!(!validation.can_download);
        assert_eq!(
            validation.message.as_deref(),
            Some("Insufficient storage space. Need 10 MB, but only 5 MB available.")
        );
    }

    #[test]
    fn ninety_percent_ceiling_is_enforced() {
        let stats = OfflineStorageStats::new(85 * MB, 100 * MB, 3, None, None);
        let validation = stats.validate_download(10 * MB);
        assert_eq!(
            validation.message.as_deref(),
            Some("Download would exceed storage limit. Please free up some space first.")
        );

        assert!(stats.validate_download(5 * MB).can_download);
    }

    #[test]
    fn formats_sizes_with_binary_units() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 1024 * 1024 / 4), "5.25 MB");
        assert_eq!(format_file_size(2 * 1024 * 1024 * 1024), "2 GB");
    }

    #[test]
    fn categorizes_common_mime_types() {
        use StorageCategory::*;
        let cases = [
            (Some("image/png"), Images),
            (Some("video/mp4"), Videos),
            (Some("audio/mpeg"), Audio),
            (Some("application/pdf"), Documents),
            (
                Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
                Spreadsheets,
            ),
            (Some("application/vnd.ms-powerpoint"), Presentations),
            (Some("application/zip"), Other),
            (None, Other),
        ];
        for (mime, expected) in cases {
            assert_eq!(StorageCategory::from_mime_type(mime), expected, "{mime:?}");
        }
    }
}

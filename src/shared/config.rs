use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_PREFIX: &str = "KINGSHARE_OFFLINE_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub max_storage_size: u64,
    pub max_file_size: u64,
    pub metadata_cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_queue_size: u32,
    pub retain_synced_edits: bool,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    pub wifi_only: bool,
    pub auto_download_starred: bool,
    pub auto_download_recent: bool,
    pub max_auto_download_size: u64,
    pub recent_files_limit: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/offline.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/offline_files"),
            max_storage_size: 2 * 1024 * 1024 * 1024, // 2GB
            max_file_size: 100 * 1024 * 1024,         // 100MB
            metadata_cache_capacity: 256,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_ms: 30_000,
            max_retries: 3,
            retry_base_delay_ms: 5_000,
            max_queue_size: 100,
            retain_synced_edits: true,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            wifi_only: true,
            auto_download_starred: false,
            auto_download_recent: false,
            max_auto_download_size: 10 * 1024 * 1024, // 10MB
            recent_files_limit: 10,
        }
    }
}

impl AppConfig {
    /// OS のデータディレクトリ配下に DB とキャッシュを置く構成
    pub fn for_platform() -> Self {
        let mut cfg = Self::default();
        if let Some(base) = dirs::data_local_dir() {
            let root = base.join("kingshare").join("offline");
            cfg.database.url = format!("sqlite:{}", root.join("offline.db").display());
            cfg.storage.data_dir = root.join("files");
        }
        cfg
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_var("DATABASE_URL") {
            cfg.database.url = v;
        }
        if let Some(value) = env_var("DATABASE_MAX_CONNECTIONS").and_then(|v| parse_u32(&v)) {
            cfg.database.max_connections = value;
        }

        if let Some(v) = env_var("DATA_DIR") {
            cfg.storage.data_dir = PathBuf::from(v);
        }
        if let Some(value) = env_var("MAX_STORAGE_SIZE").and_then(|v| parse_u64(&v)) {
            cfg.storage.max_storage_size = value;
        }
        if let Some(value) = env_var("MAX_FILE_SIZE").and_then(|v| parse_u64(&v)) {
            cfg.storage.max_file_size = value;
        }

        if let Some(v) = env_var("AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_var("SYNC_INTERVAL_MS").and_then(|v| parse_u64(&v)) {
            cfg.sync.sync_interval_ms = value.max(1_000);
        }
        if let Some(value) = env_var("MAX_RETRIES").and_then(|v| parse_u32(&v)) {
            cfg.sync.max_retries = value.max(1);
        }
        if let Some(value) = env_var("RETRY_BASE_DELAY_MS").and_then(|v| parse_u64(&v)) {
            cfg.sync.retry_base_delay_ms = value;
        }
        if let Some(value) = env_var("MAX_QUEUE_SIZE").and_then(|v| parse_u32(&v)) {
            cfg.sync.max_queue_size = value;
        }
        if let Some(value) = env_var("REQUEST_TIMEOUT_MS").and_then(|v| parse_u64(&v)) {
            cfg.sync.request_timeout_ms = value.max(1);
        }
        if let Some(v) = env_var("RETAIN_SYNCED_EDITS") {
            cfg.sync.retain_synced_edits = parse_bool(&v, cfg.sync.retain_synced_edits);
        }

        if let Some(v) = env_var("WIFI_ONLY") {
            cfg.download.wifi_only = parse_bool(&v, cfg.download.wifi_only);
        }
        if let Some(v) = env_var("AUTO_DOWNLOAD_STARRED") {
            cfg.download.auto_download_starred =
                parse_bool(&v, cfg.download.auto_download_starred);
        }
        if let Some(v) = env_var("AUTO_DOWNLOAD_RECENT") {
            cfg.download.auto_download_recent = parse_bool(&v, cfg.download.auto_download_recent);
        }
        if let Some(value) = env_var("MAX_AUTO_DOWNLOAD_SIZE").and_then(|v| parse_u64(&v)) {
            cfg.download.max_auto_download_size = value;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.storage.max_storage_size == 0 {
            return Err("Storage max_storage_size must be greater than 0".to_string());
        }
        if self.storage.max_file_size > self.storage.max_storage_size {
            return Err("Storage max_file_size must not exceed max_storage_size".to_string());
        }
        if self.storage.metadata_cache_capacity == 0 {
            return Err("Storage metadata_cache_capacity must be greater than 0".to_string());
        }
        if self.sync.max_retries == 0 {
            return Err("Sync max_retries must be greater than 0".to_string());
        }
        if self.sync.auto_sync && self.sync.sync_interval_ms == 0 {
            return Err("Sync sync_interval_ms must be greater than 0".to_string());
        }
        if self.sync.request_timeout_ms == 0 {
            return Err("Sync request_timeout_ms must be greater than 0".to_string());
        }
        if self.sync.max_queue_size == 0 {
            return Err("Sync max_queue_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}

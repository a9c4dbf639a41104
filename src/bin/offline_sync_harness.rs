use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use kingshare_offline::application::ports::remote::{
    ProgressCallback, RemoteAck, RemoteDocumentApi, RemoteError, RemoteFileSource,
};
use kingshare_offline::application::services::DownloadOptions;
use kingshare_offline::domain::entities::offline::{FileItem, WorkQueueStatus};
use kingshare_offline::domain::value_objects::offline::{
    CellRef, FileId, NetworkKind, NetworkState,
};
use kingshare_offline::infrastructure::network::ManualNetworkMonitor;
use kingshare_offline::infrastructure::offline::SyncMetricsSnapshot;
use kingshare_offline::shared::config::AppConfig;
use kingshare_offline::{init_logging, EngineCollaborators, OfflineEngine};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct HarnessConfig {
    documents: u32,
    edits_per_document: u32,
    fail_every: u64,
    offline_delay_ms: u64,
    run_seconds: u64,
    summary_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct HarnessSummary {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
    stop_reason: String,
    edits_saved: u32,
    remote_calls: u64,
    injected_failures: u64,
    queue: WorkQueueStatus,
    metrics: SyncMetricsSnapshot,
    documents: HashMap<String, String>,
}

/// 一定回数ごとに一時的な失敗を返すリモートの代役
#[derive(Default)]
struct FlakyRemote {
    fail_every: u64,
    calls: AtomicU64,
    failures: AtomicU64,
    documents: Mutex<HashMap<String, (String, i64)>>,
}

impl FlakyRemote {
    fn new(fail_every: u64) -> Self {
        Self {
            fail_every,
            ..Self::default()
        }
    }

    fn next_call(&self) -> Result<(), RemoteError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && call % self.fail_every == 0 {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RemoteError::Transient(format!("injected failure on call {call}")));
        }
        Ok(())
    }

    async fn bump(&self, file_id: &FileId, content: Option<String>) -> RemoteAck {
        let mut documents = self.documents.lock().await;
        let entry = documents
            .entry(file_id.to_string())
            .or_insert_with(|| (String::new(), 0));
        if let Some(content) = content {
            entry.0 = content;
        }
        entry.1 += 1;
        RemoteAck::versioned(entry.1)
    }
}

#[async_trait]
impl RemoteDocumentApi for FlakyRemote {
    async fn save_content(
        &self,
        file_id: &FileId,
        content: &str,
        _base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError> {
        self.next_call()?;
        Ok(self.bump(file_id, Some(content.to_string())).await)
    }

    async fn update_title(
        &self,
        file_id: &FileId,
        _title: &str,
        _base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError> {
        self.next_call()?;
        Ok(self.bump(file_id, None).await)
    }

    async fn update_cell(
        &self,
        file_id: &FileId,
        _cell_ref: &CellRef,
        _value: &serde_json::Value,
        _formula: Option<&str>,
    ) -> Result<RemoteAck, RemoteError> {
        self.next_call()?;
        Ok(self.bump(file_id, None).await)
    }
}

#[async_trait]
impl RemoteFileSource for FlakyRemote {
    async fn fetch(
        &self,
        file: &FileItem,
        on_progress: ProgressCallback,
    ) -> Result<Bytes, RemoteError> {
        self.next_call()?;
        on_progress(50);
        Ok(Bytes::from(format!("seed content for {}", file.id)))
    }

    async fn starred_files(&self) -> Result<Vec<FileItem>, RemoteError> {
        Ok(Vec::new())
    }

    async fn recent_files(&self, _limit: u32) -> Result<Vec<FileItem>, RemoteError> {
        Ok(Vec::new())
    }
}

fn parse_u64(key: &str, default_value: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default_value)
}

fn build_config() -> HarnessConfig {
    HarnessConfig {
        documents: parse_u64("KINGSHARE_HARNESS_DOCUMENTS", 3) as u32,
        edits_per_document: parse_u64("KINGSHARE_HARNESS_EDITS_PER_DOCUMENT", 4) as u32,
        fail_every: parse_u64("KINGSHARE_HARNESS_FAIL_EVERY", 5),
        offline_delay_ms: parse_u64("KINGSHARE_HARNESS_OFFLINE_DELAY_MS", 200),
        run_seconds: parse_u64("KINGSHARE_HARNESS_RUN_SECONDS", 30),
        summary_path: std::env::var("KINGSHARE_HARNESS_SUMMARY_PATH")
            .ok()
            .map(PathBuf::from),
    }
}

fn build_engine_config() -> AppConfig {
    let mut config = AppConfig::from_env();
    if std::env::var("KINGSHARE_OFFLINE_DATA_DIR").is_err() {
        let root = std::env::temp_dir().join(format!("kingshare-harness-{}", uuid::Uuid::new_v4()));
        config.database.url = format!("sqlite:{}", root.join("offline.db").display());
        config.storage.data_dir = root.join("files");
    }
    // ハーネスは短い間隔で回す
    config.sync.retry_base_delay_ms = config.sync.retry_base_delay_ms.min(200);
    config.sync.sync_interval_ms = config.sync.sync_interval_ms.min(1_000);
    config
}

async fn write_summary(path: &PathBuf, summary: &HarnessSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_vec_pretty(summary)?).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = build_config();
    let engine_config = build_engine_config();
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        documents = cfg.documents,
        edits_per_document = cfg.edits_per_document,
        fail_every = cfg.fail_every,
        data_dir = %engine_config.storage.data_dir.display(),
        "Starting offline sync harness"
    );

    if let Some(parent) = engine_config.storage.data_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let remote = Arc::new(FlakyRemote::new(cfg.fail_every));
    let network = Arc::new(ManualNetworkMonitor::new(NetworkState::online(
        NetworkKind::Wifi,
    )));
    let engine = OfflineEngine::init(
        engine_config,
        EngineCollaborators {
            documents: remote.clone(),
            files: remote.clone(),
            network: network.clone(),
        },
    )
    .await?;

    // 最初の文書だけキャッシュしておく
    let first = FileId::new("doc-0".to_string()).map_err(anyhow::Error::msg)?;
    let item = FileItem::file(first.clone(), "doc-0.txt", 64).with_mime_type("text/plain");
    if let Err(err) = engine
        .manager()
        .download_for_offline(&item, DownloadOptions::default())
        .await
    {
        warn!(error = %err, "Initial download failed");
    }

    network.set_state(NetworkState::offline()).await;
    let mut edits_saved = 0;
    for doc in 0..cfg.documents {
        let file_id = FileId::new(format!("doc-{doc}")).map_err(anyhow::Error::msg)?;
        for revision in 0..cfg.edits_per_document {
            let content = format!("doc-{doc} revision {revision}");
            let title = (revision == 0).then(|| format!("Document {doc}"));
            let saved = engine
                .editing()
                .save_document_offline(&file_id, &content, title.as_deref())
                .await?;
            edits_saved += saved.len() as u32;
        }
    }
    let sheet = FileId::new("sheet-0".to_string()).map_err(anyhow::Error::msg)?;
    engine
        .editing()
        .save_spreadsheet_cell_offline(&sheet, "A1", json!(42), None)
        .await?;
    edits_saved += 1;

    tokio::time::sleep(Duration::from_millis(cfg.offline_delay_ms)).await;
    network.set_state(NetworkState::online(NetworkKind::Wifi)).await;

    let stop_reason = loop {
        if start_instant.elapsed() >= Duration::from_secs(cfg.run_seconds) {
            break "timeout";
        }
        let status = engine.sync().queue_status().await?;
        if !status.has_outstanding() && !status.is_processing {
            break "drained";
        }
        if status.pending_edits == 0 && status.failed_edits > 0 && !status.is_processing {
            // 失敗した編集は手動同期で戻す
            engine.editing().sync_pending_edits().await?;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break "ctrl_c",
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    };

    let documents = remote
        .documents
        .lock()
        .await
        .iter()
        .map(|(id, (content, _))| (id.clone(), content.clone()))
        .collect();
    let summary = HarnessSummary {
        started_at,
        finished_at: Utc::now(),
        duration_ms: start_instant.elapsed().as_millis() as u64,
        stop_reason: stop_reason.to_string(),
        edits_saved,
        remote_calls: remote.calls.load(Ordering::SeqCst),
        injected_failures: remote.failures.load(Ordering::SeqCst),
        queue: engine.sync().queue_status().await?,
        metrics: engine.sync().metrics(),
        documents,
    };

    engine.dispose().await;

    if let Some(path) = &cfg.summary_path {
        write_summary(path, &summary).await?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

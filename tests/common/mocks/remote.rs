use async_trait::async_trait;
use bytes::Bytes;
use kingshare_offline::application::ports::remote::{
    ProgressCallback, RemoteAck, RemoteDocumentApi, RemoteError, RemoteFileSource,
};
use kingshare_offline::domain::entities::offline::FileItem;
use kingshare_offline::domain::value_objects::offline::{CellRef, FileId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    SaveContent {
        file_id: String,
        content: String,
        base_version: Option<i64>,
    },
    UpdateTitle {
        file_id: String,
        title: String,
        base_version: Option<i64>,
    },
    UpdateCell {
        file_id: String,
        cell_ref: String,
        value: Value,
        formula: Option<String>,
    },
}

impl RemoteCall {
    pub fn file_id(&self) -> &str {
        match self {
            RemoteCall::SaveContent { file_id, .. }
            | RemoteCall::UpdateTitle { file_id, .. }
            | RemoteCall::UpdateCell { file_id, .. } => file_id,
        }
    }
}

/// 反映に成功した呼び出しを順に記録するリモートの代役
#[derive(Default)]
pub struct RecordingRemote {
    calls: Mutex<Vec<RemoteCall>>,
    attempts: AtomicUsize,
    entered: AtomicUsize,
    fetches: AtomicUsize,
    always_fail: Mutex<Option<RemoteError>>,
    conflicts: Mutex<HashMap<String, Option<i64>>>,
    versions: Mutex<HashMap<String, i64>>,
    // 基準版を照合するファイル
    checked: Mutex<HashSet<String>>,
    reject_next_title: Mutex<Option<RemoteError>>,
    files: Mutex<HashMap<String, Bytes>>,
    starred: Mutex<Vec<FileItem>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

#[allow(dead_code)]
impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, file_id: &str) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.file_id() == file_id)
            .cloned()
            .collect()
    }

    /// 失敗を含む全試行回数
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// ゲート待ちに入った呼び出し数
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn fail_always(&self, error: RemoteError) {
        *self.always_fail.lock().await = Some(error);
    }

    pub async fn heal(&self) {
        *self.always_fail.lock().await = None;
        self.conflicts.lock().await.clear();
    }

    pub async fn conflict_on(&self, file_id: &str, remote_version: Option<i64>) {
        if let Some(version) = remote_version {
            self.versions
                .lock()
                .await
                .insert(file_id.to_string(), version);
        }
        self.conflicts
            .lock()
            .await
            .insert(file_id.to_string(), remote_version);
    }

    /// サーバー側の版を `version` にし、以降は基準版が一致しない書き込みを衝突にする
    pub async fn serve_version(&self, file_id: &str, version: i64) {
        self.versions
            .lock()
            .await
            .insert(file_id.to_string(), version);
        self.checked.lock().await.insert(file_id.to_string());
    }

    /// 次のタイトル更新を一度だけ `error` で失敗させる
    pub async fn reject_next_title(&self, error: RemoteError) {
        *self.reject_next_title.lock().await = Some(error);
    }

    pub async fn put_file(&self, file_id: &str, bytes: impl Into<Bytes>) {
        self.files
            .lock()
            .await
            .insert(file_id.to_string(), bytes.into());
    }

    pub async fn set_starred(&self, items: Vec<FileItem>) {
        *self.starred.lock().await = items;
    }

    /// 以降の呼び出しを許可が出るまで止める
    pub async fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    async fn enter(&self, file_id: &FileId) -> Result<(), RemoteError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| RemoteError::Transient("gate closed".into()))?
                .forget();
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.always_fail.lock().await.clone() {
            return Err(error);
        }
        if let Some(remote_version) = self.conflicts.lock().await.get(file_id.as_str()) {
            return Err(RemoteError::Conflict {
                message: format!("{file_id} was changed remotely"),
                remote_version: *remote_version,
            });
        }
        Ok(())
    }

    async fn check_base(
        &self,
        file_id: &FileId,
        base_version: Option<i64>,
    ) -> Result<(), RemoteError> {
        if !self.checked.lock().await.contains(file_id.as_str()) {
            return Ok(());
        }
        let current = self.versions.lock().await.get(file_id.as_str()).copied();
        if base_version != current {
            return Err(RemoteError::Conflict {
                message: format!("{file_id} is at {current:?}, not {base_version:?}"),
                remote_version: current,
            });
        }
        Ok(())
    }

    async fn record(&self, call: RemoteCall) -> RemoteAck {
        let mut versions = self.versions.lock().await;
        let version = versions.entry(call.file_id().to_string()).or_insert(0);
        *version += 1;
        let ack = RemoteAck::versioned(*version);
        drop(versions);
        self.calls.lock().await.push(call);
        ack
    }
}

#[async_trait]
impl RemoteDocumentApi for RecordingRemote {
    async fn save_content(
        &self,
        file_id: &FileId,
        content: &str,
        base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError> {
        self.enter(file_id).await?;
        self.check_base(file_id, base_version).await?;
        Ok(self
            .record(RemoteCall::SaveContent {
                file_id: file_id.to_string(),
                content: content.to_string(),
                base_version,
            })
            .await)
    }

    async fn update_title(
        &self,
        file_id: &FileId,
        title: &str,
        base_version: Option<i64>,
    ) -> Result<RemoteAck, RemoteError> {
        self.enter(file_id).await?;
        if let Some(error) = self.reject_next_title.lock().await.take() {
            return Err(error);
        }
        self.check_base(file_id, base_version).await?;
        Ok(self
            .record(RemoteCall::UpdateTitle {
                file_id: file_id.to_string(),
                title: title.to_string(),
                base_version,
            })
            .await)
    }

    async fn update_cell(
        &self,
        file_id: &FileId,
        cell_ref: &CellRef,
        value: &Value,
        formula: Option<&str>,
    ) -> Result<RemoteAck, RemoteError> {
        self.enter(file_id).await?;
        Ok(self
            .record(RemoteCall::UpdateCell {
                file_id: file_id.to_string(),
                cell_ref: cell_ref.to_string(),
                value: value.clone(),
                formula: formula.map(str::to_string),
            })
            .await)
    }
}

#[async_trait]
impl RemoteFileSource for RecordingRemote {
    async fn fetch(
        &self,
        file: &FileItem,
        on_progress: ProgressCallback,
    ) -> Result<Bytes, RemoteError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| RemoteError::Transient("gate closed".into()))?
                .forget();
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let bytes = self
            .files
            .lock()
            .await
            .get(file.id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::Rejected(format!("{} not found", file.id)))?;
        on_progress(50);
        Ok(bytes)
    }

    async fn starred_files(&self) -> Result<Vec<FileItem>, RemoteError> {
        Ok(self.starred.lock().await.clone())
    }

    async fn recent_files(&self, limit: u32) -> Result<Vec<FileItem>, RemoteError> {
        Ok(self
            .starred
            .lock()
            .await
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

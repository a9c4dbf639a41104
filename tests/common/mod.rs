pub mod mocks;

use kingshare_offline::domain::value_objects::offline::{FileId, NetworkKind, NetworkState};
use kingshare_offline::infrastructure::network::ManualNetworkMonitor;
use kingshare_offline::shared::config::AppConfig;
use kingshare_offline::{EngineCollaborators, OfflineEngine};
use mocks::RecordingRemote;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub const MB: u64 = 1024 * 1024;

pub struct TestEngine {
    pub engine: OfflineEngine,
    pub remote: Arc<RecordingRemote>,
    pub network: Arc<ManualNetworkMonitor>,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestEngine {
    pub async fn go_offline(&self) {
        self.network.set_state(NetworkState::offline()).await;
    }

    pub async fn go_online(&self) {
        self.network
            .set_state(NetworkState::online(NetworkKind::Wifi))
            .await;
    }

    /// 同じディレクトリでエンジンを作り直す（再起動の再現）
    pub async fn restart(self) -> TestEngine {
        self.engine.dispose().await;
        let config = self.engine.config();
        let engine = OfflineEngine::init(
            config,
            EngineCollaborators {
                documents: self.remote.clone(),
                files: self.remote.clone(),
                network: self.network.clone(),
            },
        )
        .await
        .expect("restart engine");
        TestEngine { engine, ..self }
    }
}

pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}", dir.join("offline.db").display());
    config.storage.data_dir = dir.join("files");
    config.sync.auto_sync = false;
    config.sync.retry_base_delay_ms = 1;
    config.sync.request_timeout_ms = 2_000;
    config
}

#[allow(dead_code)]
pub async fn setup_engine() -> TestEngine {
    setup_engine_with(|_| {}).await
}

pub async fn setup_engine_with(configure: impl FnOnce(&mut AppConfig)) -> TestEngine {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(dir.path());
    configure(&mut config);

    let remote = Arc::new(RecordingRemote::new());
    let network = Arc::new(ManualNetworkMonitor::new(NetworkState::online(
        NetworkKind::Wifi,
    )));
    let engine = OfflineEngine::init(
        config,
        EngineCollaborators {
            documents: remote.clone(),
            files: remote.clone(),
            network: network.clone(),
        },
    )
    .await
    .expect("init engine");

    TestEngine {
        engine,
        remote,
        network,
        dir,
    }
}

pub fn file_id(value: &str) -> FileId {
    FileId::new(value.to_string()).expect("file id")
}

/// 条件が満たされるまで待つ。時間切れなら `false`。
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

use crate::domain::value_objects::offline::NetworkState;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// 到達性の監視。初期化時に一度 `current` を参照し、以降は購読する。
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn current(&self) -> NetworkState;

    fn subscribe(&self) -> broadcast::Receiver<NetworkState>;
}

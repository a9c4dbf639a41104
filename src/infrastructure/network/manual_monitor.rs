use crate::application::ports::network::NetworkMonitor;
use crate::domain::value_objects::offline::NetworkState;
use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

const CHANNEL_CAPACITY: usize = 32;

/// ホスト側が到達性の変化を流し込む `NetworkMonitor` 実装
pub struct ManualNetworkMonitor {
    state: RwLock<NetworkState>,
    sender: broadcast::Sender<NetworkState>,
}

impl ManualNetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(initial),
            sender,
        }
    }

    /// 状態を更新し、変化があれば購読者へ配信する
    pub async fn set_state(&self, next: NetworkState) {
        let mut state = self.state.write().await;
        if *state == next {
            return;
        }
        *state = next;
        drop(state);

        info!(
            target: "offline::network",
            is_connected = next.is_connected,
            kind = ?next.kind,
            "Network reachability changed"
        );
        // 購読者がいない場合の送信エラーは無視してよい
        let _ = self.sender.send(next);
    }
}

#[async_trait]
impl NetworkMonitor for ManualNetworkMonitor {
    async fn current(&self) -> NetworkState {
        *self.state.read().await
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.sender.subscribe()
    }
}

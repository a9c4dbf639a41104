use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Wifi,
    Ethernet,
    Cellular,
    Unknown,
    None,
}

impl NetworkKind {
    /// 従量課金でない回線か（Wi-Fi 限定ポリシーの判定に使う）
    pub fn is_unmetered(&self) -> bool {
        matches!(self, NetworkKind::Wifi | NetworkKind::Ethernet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    pub kind: NetworkKind,
}

impl NetworkState {
    pub fn online(kind: NetworkKind) -> Self {
        Self {
            is_connected: true,
            kind,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            kind: NetworkKind::None,
        }
    }
}

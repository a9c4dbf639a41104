use serde::{Deserialize, Serialize};
use std::fmt;

/// 同期実行のきっかけ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Reconnect,
    Interval,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Reconnect => "reconnect",
            SyncTrigger::Interval => "interval",
        }
    }

    /// failed になった編集を再試行対象に戻すか
    pub fn retries_failed(&self) -> bool {
        !matches!(self, SyncTrigger::Interval)
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    /// 失敗したが再試行枠が残っている
    Retry,
    /// 再試行枠を使い切った、または恒久的に拒否された
    Failure,
    Conflict,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttemptMetadata {
    pub edit_id: Option<String>,
    pub file_id: Option<String>,
    pub trigger: Option<String>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub total_success: u64,
    pub total_retry: u64,
    pub total_failure: u64,
    pub total_conflict: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<SyncOutcome>,
    pub last_attempt: Option<SyncAttemptMetadata>,
}

/// 同期試行の成功・失敗カウンタ
pub struct SyncMetrics {
    success: AtomicU64,
    retry: AtomicU64,
    failure: AtomicU64,
    conflict: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last: Mutex<Option<(SyncOutcome, SyncAttemptMetadata)>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            retry: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            conflict: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn record(&self, outcome: SyncOutcome, meta: SyncAttemptMetadata) {
        match outcome {
            SyncOutcome::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
                self.last_success_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            SyncOutcome::Retry | SyncOutcome::Failure => {
                let counter = if outcome == SyncOutcome::Retry {
                    &self.retry
                } else {
                    &self.failure
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
            SyncOutcome::Conflict => {
                self.conflict.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.last.lock() {
            *guard = Some((outcome, meta));
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None);

        SyncMetricsSnapshot {
            total_success: self.success.load(Ordering::Relaxed),
            total_retry: self.retry.load(Ordering::Relaxed),
            total_failure: self.failure.load(Ordering::Relaxed),
            total_conflict: self.conflict.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: last.as_ref().map(|(outcome, _)| *outcome),
            last_attempt: last.map(|(_, meta)| meta),
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_outcomes_and_consecutive_failures() {
        let metrics = SyncMetrics::new();

        metrics.record(
            SyncOutcome::Retry,
            SyncAttemptMetadata {
                edit_id: Some("e-1".into()),
                retry_count: Some(1),
                max_retries: Some(3),
                backoff_ms: Some(5_000),
                ..SyncAttemptMetadata::default()
            },
        );
        metrics.record(SyncOutcome::Failure, SyncAttemptMetadata::default());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_retry, 1);
        assert_eq!(snapshot.total_failure, 1);
        assert_eq!(snapshot.consecutive_failure, 2);
        assert!(snapshot.last_failure_ms.is_some());
        assert!(snapshot.last_success_ms.is_none());

        metrics.record(
            SyncOutcome::Success,
            SyncAttemptMetadata {
                edit_id: Some("e-2".into()),
                ..SyncAttemptMetadata::default()
            },
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_success, 1);
        assert_eq!(snapshot.consecutive_failure, 0);
        assert_eq!(snapshot.last_outcome, Some(SyncOutcome::Success));
        assert_eq!(
            snapshot.last_attempt.and_then(|meta| meta.edit_id).as_deref(),
            Some("e-2")
        );
    }

    #[test]
    fn conflicts_do_not_count_as_failures() {
        let metrics = SyncMetrics::new();
        metrics.record(SyncOutcome::Conflict, SyncAttemptMetadata::default());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_conflict, 1);
        assert_eq!(snapshot.consecutive_failure, 0);
    }
}

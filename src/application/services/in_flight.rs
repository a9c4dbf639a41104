use crate::domain::value_objects::offline::FileId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// ファイル単位の実行中集合。同じファイルへの処理の重複を防ぐ。
#[derive(Clone, Default)]
pub struct InFlightSet {
    keys: Arc<Mutex<HashSet<FileId>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既に実行中なら `None`
    pub fn try_acquire(&self, file_id: &FileId) -> Option<InFlightGuard> {
        let mut keys = lock(&self.keys);
        if !keys.insert(file_id.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            file_id: file_id.clone(),
        })
    }

    pub fn contains(&self, file_id: &FileId) -> bool {
        lock(&self.keys).contains(file_id)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.keys).is_empty()
    }

    pub fn snapshot(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = lock(&self.keys).iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// ドロップ時に集合から外れる（キャンセル時も含む）
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<FileId>>>,
    file_id: FileId,
}

impl InFlightGuard {
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.file_id);
    }
}

fn lock(keys: &Mutex<HashSet<FileId>>) -> MutexGuard<'_, HashSet<FileId>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

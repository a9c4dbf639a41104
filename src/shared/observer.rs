use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// 任意個のリスナーへ値を配信する購読レジストリ。
///
/// 通知はロックを外してから行うため、リスナー内で再購読・解除しても
/// デッドロックしない。
pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut guard = lock(&self.inner);
            let id = guard.next_id;
            guard.next_id += 1;
            guard.entries.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

impl<T: 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(inner: &Mutex<Listeners<T>>) -> MutexGuard<'_, Listeners<T>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 購読ハンドル。`unsubscribe` かドロップで解除される。
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// レジストリが破棄されるまで購読を維持する
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_every_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let first = {
            let total = Arc::clone(&total);
            registry.subscribe(move |v| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            })
        };
        let second = {
            let total = Arc::clone(&total);
            registry.subscribe(move |v| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            })
        };

        registry.emit(&5);
        assert_eq!(total.load(Ordering::SeqCst), 10);
        assert_eq!(registry.listener_count(), 2);

        first.unsubscribe();
        registry.emit(&1);
        assert_eq!(total.load(Ordering::SeqCst), 11);

        drop(second);
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn detached_subscription_survives_drop() {
        let registry = ListenerRegistry::<()>::new();
        registry.subscribe(|_| {}).detach();
        assert_eq!(registry.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_noop() {
        let registry = ListenerRegistry::<()>::new();
        let subscription = registry.subscribe(|_| {});
        drop(registry);
        subscription.unsubscribe();
    }
}

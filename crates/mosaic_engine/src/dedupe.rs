use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

/// Collapses concurrent lookups of the same key onto one shared future.
///
/// Settled results stay cached until [`InflightCache::invalidate`] or [`InflightCache::clear`].
pub struct InflightCache<K, V: Clone> {
    entries: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for InflightCache<K, V>
where
    V: Clone,
{
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InflightCache<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight lookup for `key`, or start one with `start`.
    pub async fn get_or_start<F, Fut>(&self, key: K, start: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .entry(key)
                .or_insert_with(|| start().boxed().shared())
                .clone()
        };
        shared.await
    }

    /// Like [`InflightCache::get_or_start`], but drops the entry when `discard` rejects the
    /// settled value. Only the future this call joined is dropped; a newer lookup started
    /// under the same key in the meantime stays cached.
    pub async fn get_or_start_unless<F, Fut>(&self, key: K, start: F, discard: impl FnOnce(&V) -> bool) -> V
    where
        K: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .entry(key.clone())
                .or_insert_with(|| start().boxed().shared())
                .clone()
        };
        let value = shared.clone().await;
        if discard(&value) {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
                entries.remove(&key);
            }
        }
        value
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_lookup() {
        let cache: InflightCache<&str, u32> = InflightCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let start = || {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                7
            }
        };

        let (a, b) = tokio::join!(cache.get_or_start("x", start()), cache.get_or_start("x", start()));
        assert_eq!((a, b), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn stale_failure_leaves_a_newer_lookup_cached() {
        let cache: InflightCache<&str, Result<u32, String>> = InflightCache::new();

        let stale = cache
            .get_or_start_unless("x", || async { Err("down".to_string()) }, |value| value.is_err())
            .await;
        assert!(stale.is_err());
        assert!(cache.is_empty());

        // A failing caller that joined an older future must not drop the fresh one.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let old = cache.get_or_start_unless(
            "y",
            || async move {
                let _ = rx.await;
                Err("down".to_string())
            },
            |value| value.is_err(),
        );
        let replace = async {
            tokio::task::yield_now().await;
            cache.invalidate(&"y");
            let fresh = cache.get_or_start("y", || async { Ok(3) }).await;
            let _ = tx.send(());
            fresh
        };
        let (old, fresh) = tokio::join!(old, replace);

        assert!(old.is_err());
        assert_eq!(fresh, Ok(3));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_or_start("y", || async { Ok(99) }).await, Ok(3));
    }
}

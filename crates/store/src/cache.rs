//! Snapshot bookkeeping shared by the stores.
//!
//! A snapshot is replaced whole, and only by a load that fully succeeded. The
//! lock is taken for bookkeeping and swaps only; it is never held while the
//! remote is being queried.

use crate::error::{ErrorKind, Result};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Progress and outcome of the loads of one store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatus {
    pub loading: bool,
    /// Why the most recent load failed. Cleared when a load starts.
    pub error: Option<ErrorKind>,
    /// When the snapshot was last replaced.
    pub last_updated: Option<Instant>,
}

impl CacheStatus {
    pub fn is_fresh(&self, staleness: Duration) -> bool {
        self.last_updated.is_some_and(|at| at.elapsed() < staleness)
    }
}

struct Cached<S> {
    data: S,
    status: CacheStatus,
}

pub(crate) struct Cache<S> {
    inner: RwLock<Cached<S>>,
    staleness: Duration,
}

impl<S: Clone + Default> Cache<S> {
    pub(crate) fn new(staleness: Duration) -> Self {
        Self { inner: RwLock::new(Cached { data: S::default(), status: CacheStatus::default() }), staleness }
    }

    /// Whether a load should go ahead. Marks the load as started if so.
    ///
    /// Loads already in flight are not taken into account. When two overlap,
    /// the first to finish clears `loading` while the other is still running.
    pub(crate) async fn begin(&self, force: bool) -> bool {
        let mut guard = self.inner.write().await;
        if !force && guard.status.is_fresh(self.staleness) {
            debug!(staleness = ?self.staleness, "snapshot still fresh, skipping load");
            return false;
        }
        guard.status.loading = true;
        guard.status.error = None;
        true
    }

    /// Record the outcome of a load started with [`begin`](Self::begin).
    pub(crate) async fn finish(&self, outcome: Result<S>) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.status.loading = false;
        match outcome {
            Ok(data) => {
                guard.data = data;
                guard.status.last_updated = Some(Instant::now());
                Ok(())
            },
            Err(err) => {
                guard.status.error = Some((*err).clone());
                Err(err)
            },
        }
    }

    pub(crate) async fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.read().await.data)
    }

    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.write().await.data)
    }

    pub(crate) async fn snapshot(&self) -> S {
        self.inner.read().await.data.clone()
    }

    pub(crate) async fn status(&self) -> CacheStatus {
        self.inner.read().await.status.clone()
    }
}

/// Apply `patch` to the item with `id`. Returns whether it was found.
pub(crate) fn patch_by<T, K: PartialEq>(
    items: &mut [T],
    id: &K,
    key: impl Fn(&T) -> &K,
    patch: impl FnOnce(&mut T),
) -> bool {
    match items.iter_mut().find(|item| key(item) == id) {
        Some(item) => {
            patch(item);
            true
        },
        None => false,
    }
}

/// Drop every item with `id`. Returns whether any was removed.
pub(crate) fn remove_by<T, K: PartialEq>(items: &mut Vec<T>, id: &K, key: impl Fn(&T) -> &K) -> bool {
    let before = items.len();
    items.retain(|item| key(item) != id);
    items.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitenav_db::error::ErrorKind as DbErrorKind;

    const STALENESS: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_begin_respects_staleness() {
        let cache: Cache<Vec<u8>> = Cache::new(STALENESS);
        assert!(cache.begin(false).await);
        cache.finish(Ok(vec![1])).await.unwrap();
        assert!(!cache.begin(false).await);
        assert!(cache.begin(true).await);
        cache.finish(Ok(vec![2])).await.unwrap();

        tokio::time::advance(STALENESS - Duration::from_secs(1)).await;
        assert!(!cache.begin(false).await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.begin(false).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_keeps_snapshot() {
        let cache: Cache<Vec<u8>> = Cache::new(STALENESS);
        cache.begin(false).await;
        cache.finish(Ok(vec![1])).await.unwrap();
        let loaded_at = cache.status().await.last_updated;

        tokio::time::advance(STALENESS).await;
        assert!(cache.begin(false).await);
        assert!(cache.status().await.loading);
        let err = exn::Exn::from(ErrorKind::Load(DbErrorKind::NotFound("x".to_string())));
        assert!(cache.finish(Err(err)).await.is_err());

        let status = cache.status().await;
        assert!(!status.loading);
        assert_eq!(status.last_updated, loaded_at);
        assert!(matches!(status.error, Some(ErrorKind::Load(_))));
        assert_eq!(cache.snapshot().await, vec![1]);

        // The next attempt starts with a clean error.
        assert!(cache.begin(false).await);
        assert_eq!(cache.status().await.error, None);
    }

    #[test]
    fn test_patch_and_remove_by() {
        let mut items = vec![(1, "a"), (2, "b"), (1, "c")];
        assert!(patch_by(&mut items, &2, |i| &i.0, |i| i.1 = "B"));
        assert!(!patch_by(&mut items, &3, |i| &i.0, |i| i.1 = "C"));
        assert!(remove_by(&mut items, &1, |i| &i.0));
        assert_eq!(items, vec![(2, "B")]);
        assert!(!remove_by(&mut items, &1, |i| &i.0));
    }
}

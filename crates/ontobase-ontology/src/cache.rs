//! Epoch-scoped memo cache with request coalescing.
//!
//! Every entry is keyed by `(epoch, key)`. The first caller for a key runs
//! the computation inside a `OnceLock`; concurrent callers for the same key
//! block on that cell and share its value. Seeing a newer epoch purges every
//! older entry. Requests against an older epoch than the newest seen are
//! computed but not cached.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub computations: u64,
    pub hits: u64,
    pub newest_epoch: u64,
}

#[derive(Debug)]
pub(crate) struct EpochCache<K, V>
where
    K: Eq + Hash,
{
    cells: DashMap<(u64, K), Arc<OnceLock<V>>>,
    newest: AtomicU64,
    computations: AtomicU64,
    hits: AtomicU64,
}

impl<K, V> Default for EpochCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
            newest: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }
}

impl<K, V> EpochCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn get_or_compute(&self, epoch: u64, key: K, compute: impl FnOnce() -> V) -> V {
        let newest = self.newest.fetch_max(epoch, Ordering::SeqCst);
        if epoch > newest {
            let before = self.cells.len();
            self.cells.retain(|(e, _), _| *e >= epoch);
            tracing::debug!(
                epoch,
                purged = before.saturating_sub(self.cells.len()),
                "epoch advanced; purged cached entries"
            );
        } else if epoch < newest {
            tracing::debug!(epoch, newest, "stale epoch; computing without cache");
            self.computations.fetch_add(1, Ordering::Relaxed);
            return compute();
        }

        // Clone the cell out so the shard lock is released before computing.
        let cell = self
            .cells
            .entry((epoch, key))
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();

        let mut computed = false;
        let value = cell
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .clone();

        if computed {
            self.computations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cells.len(),
            computations: self.computations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            newest_epoch: self.newest.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn clear(&self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_epoch_purges_older_entries() {
        let cache: EpochCache<&str, u32> = EpochCache::default();
        assert_eq!(cache.get_or_compute(1, "a", || 1), 1);
        assert_eq!(cache.get_or_compute(1, "a", || 99), 1);
        assert_eq!(cache.stats().hits, 1);

        assert_eq!(cache.get_or_compute(2, "a", || 2), 2);
        assert_eq!(cache.stats().entries, 1);

        // Stale epochs are served but never cached.
        assert_eq!(cache.get_or_compute(1, "a", || 7), 7);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let cache: EpochCache<u32, u32> = EpochCache::default();
        let runs = AtomicU64::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    cache.get_or_compute(1, 7, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        42
                    })
                });
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().computations, 1);
        assert_eq!(cache.stats().hits, 7);
    }
}

//! Shared counter store abstraction and the in-memory implementation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::TrellisResult;

/// Result of pruning and counting one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCount {
    /// Entries in the window after the operation
    pub count: u64,
    /// Whether this operation appended an entry
    pub added: bool,
    /// Timestamp of the oldest surviving entry, in epoch milliseconds
    pub oldest_ms: Option<i64>,
}

/// Atomic timestamped-multiset operations backing the sliding-window limiter.
///
/// Each method must be atomic per key across every process sharing the
/// store. A Redis implementation maps `add_if_below` onto one Lua script
/// running ZREMRANGEBYSCORE, ZCARD, ZADD and EXPIRE.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Prune entries older than `window`, then append one if fewer than `limit` remain
    async fn add_if_below(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> TrellisResult<WindowCount>;

    /// Prune, then append unconditionally
    async fn add(&self, key: &str, now_ms: i64, window: Duration) -> TrellisResult<WindowCount>;

    /// Prune and count without appending
    async fn count(&self, key: &str, now_ms: i64, window: Duration) -> TrellisResult<WindowCount>;

    /// Delete a key; returns whether it existed
    async fn clear(&self, key: &str) -> TrellisResult<bool>;

    /// Round-trip check used by health probes
    async fn ping(&self) -> TrellisResult<()>;
}

#[derive(Debug, Default)]
struct WindowLog {
    /// (timestamp ms, unique member)
    entries: Vec<(i64, Uuid)>,
    expires_at_ms: i64,
}

impl WindowLog {
    fn prune(&mut self, now_ms: i64, window: Duration) {
        if self.expires_at_ms <= now_ms {
            self.entries.clear();
        }
        let cutoff = now_ms - window_ms(window);
        self.entries.retain(|(ts, _)| *ts > cutoff);
    }

    fn push(&mut self, now_ms: i64, window: Duration) {
        self.entries.push((now_ms, Uuid::new_v4()));
        self.expires_at_ms = now_ms + window_ms(window);
    }

    fn snapshot(&self, added: bool) -> WindowCount {
        WindowCount {
            count: self.entries.len() as u64,
            added,
            oldest_ms: self.entries.iter().map(|(ts, _)| *ts).min(),
        }
    }
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

/// Operations between full sweeps of expired keys
const SWEEP_EVERY: u64 = 256;

/// Process-local counter store.
///
/// Atomicity per key comes from the dashmap shard lock held for the whole
/// prune-count-append sequence. Keys expire `window` after their last append.
/// A key left empty by a prune is dropped at once, and every `SWEEP_EVERY`
/// operations the whole map is swept for keys nobody has touched since.
#[derive(Default)]
pub struct MemoryCounterStore {
    logs: DashMap<String, WindowLog>,
    operations: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn key_count(&self) -> usize {
        self.logs.len()
    }

    /// Drop keys whose TTL has passed
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| log.expires_at_ms > now_ms);
        let purged = before.saturating_sub(self.logs.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.logs.len(), "purged expired rate limit keys");
        }
        purged
    }

    /// Must run before any shard lock is taken
    fn sweep_if_due(&self, now_ms: i64) {
        let seen = self.operations.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % SWEEP_EVERY == 0 {
            self.purge_expired(now_ms);
        }
    }

    fn drop_if_empty(&self, key: &str, snapshot: WindowCount) -> WindowCount {
        if snapshot.count == 0 {
            self.logs.remove_if(key, |_, log| log.entries.is_empty());
        }
        snapshot
    }
}

impl fmt::Debug for MemoryCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCounterStore")
            .field("keys", &self.logs.len())
            .finish()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn add_if_below(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> TrellisResult<WindowCount> {
        self.sweep_if_due(now_ms);
        let snapshot = {
            let mut log = self.logs.entry(key.to_string()).or_default();
            log.prune(now_ms, window);
            let added = (log.entries.len() as u64) < limit;
            if added {
                log.push(now_ms, window);
            }
            log.snapshot(added)
        };
        Ok(self.drop_if_empty(key, snapshot))
    }

    async fn add(&self, key: &str, now_ms: i64, window: Duration) -> TrellisResult<WindowCount> {
        self.sweep_if_due(now_ms);
        let mut log = self.logs.entry(key.to_string()).or_default();
        log.prune(now_ms, window);
        log.push(now_ms, window);
        Ok(log.snapshot(true))
    }

    async fn count(&self, key: &str, now_ms: i64, window: Duration) -> TrellisResult<WindowCount> {
        self.sweep_if_due(now_ms);
        let snapshot = match self.logs.get_mut(key) {
            Some(mut log) => {
                log.prune(now_ms, window);
                log.snapshot(false)
            }
            None => return Ok(WindowCount::default()),
        };
        Ok(self.drop_if_empty(key, snapshot))
    }

    async fn clear(&self, key: &str) -> TrellisResult<bool> {
        Ok(self.logs.remove(key).is_some())
    }

    async fn ping(&self) -> TrellisResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_add_if_below_stops_at_limit() {
        let store = MemoryCounterStore::new();
        for i in 1..=3 {
            let res = store.add_if_below("k", 1_000, MINUTE, 3).await.unwrap();
            assert!(res.added);
            assert_eq!(res.count, i);
        }
        let res = store.add_if_below("k", 1_000, MINUTE, 3).await.unwrap();
        assert!(!res.added);
        assert_eq!(res.count, 3);
        assert_eq!(res.oldest_ms, Some(1_000));
    }

    #[tokio::test]
    async fn test_same_millisecond_entries_stay_distinct() {
        let store = MemoryCounterStore::new();
        store.add("k", 5, MINUTE).await.unwrap();
        store.add("k", 5, MINUTE).await.unwrap();
        let res = store.count("k", 5, MINUTE).await.unwrap();
        assert_eq!(res.count, 2);
    }

    #[tokio::test]
    async fn test_prune_drops_entries_outside_window() {
        let store = MemoryCounterStore::new();
        store.add("k", 0, MINUTE).await.unwrap();
        store.add("k", 30_000, MINUTE).await.unwrap();

        let res = store.count("k", 60_000, MINUTE).await.unwrap();
        assert_eq!(res.count, 1);
        assert_eq!(res.oldest_ms, Some(30_000));

        // Past the TTL set by the last append the key is empty
        let res = store.count("k", 90_001, MINUTE).await.unwrap();
        assert_eq!(res.count, 0);
        assert_eq!(res.oldest_ms, None);
    }

    #[tokio::test]
    async fn test_clear_and_purge() {
        let store = MemoryCounterStore::new();
        store.add("a", 0, MINUTE).await.unwrap();
        store.add("b", 50_000, MINUTE).await.unwrap();

        assert!(store.clear("a").await.unwrap());
        assert!(!store.clear("a").await.unwrap());

        assert_eq!(store.purge_expired(200_000), 1);
        assert_eq!(store.key_count(), 0);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_emptied_key_is_dropped() {
        let store = MemoryCounterStore::new();
        store.add("k", 0, MINUTE).await.unwrap();
        assert_eq!(store.key_count(), 1);

        assert_eq!(store.count("k", 120_000, MINUTE).await.unwrap().count, 0);
        assert_eq!(store.key_count(), 0);

        // A zero limit never appends, so the key is not kept either
        let res = store.add_if_below("z", 0, MINUTE, 0).await.unwrap();
        assert!(!res.added);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_clients_are_swept() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(1);
        for i in 0..500 {
            store.add_if_below(&format!("ip:{}", i), 0, window, 10).await.unwrap();
        }
        assert_eq!(store.key_count(), 500);

        // Same traffic from one new client after every window has passed
        for _ in 0..SWEEP_EVERY {
            store.add_if_below("ip:fresh", 1_200, window, u64::MAX).await.unwrap();
        }
        assert_eq!(store.key_count(), 1);
    }

    #[tokio::test]
    async fn test_count_on_missing_key_does_not_create_it() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.count("ghost", 0, MINUTE).await.unwrap().count, 0);
        assert_eq!(store.key_count(), 0);
    }
}

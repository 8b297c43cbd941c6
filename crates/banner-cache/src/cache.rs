//! Cache implementation: concurrent map, counters, and the eviction sweep

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::debug;

use crate::types::{CacheEntry, CacheKey, CacheStats};

/// Entry count at which an insert runs a synchronous sweep pass, bounding
/// growth between timer-driven sweeps.
const SIZE_TRIGGER: usize = 20;

/// Minimum share of window traffic an entry must account for to survive a
/// sweep. Heat is relative to total traffic, not an absolute hit count.
const MIN_HEAT: f64 = 0.2;

struct CacheInner {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    default_ttl: Option<Duration>,
    /// Reads and inserts in the current sweep window; the denominator of the
    /// frequency predicate. Reset to zero by every sweep.
    global_hits: AtomicU64,
    shutdown: watch::Sender<bool>,
}

/// Shared handle to one banner cache.
///
/// Clones are cheap and refer to the same entries and counters; one handle is
/// shared by every request handler and by the background sweep task. Counters
/// belong to the instance, so independent caches (e.g. in tests) never
/// interfere with each other.
#[derive(Clone)]
pub struct BannerCache {
    inner: Arc<CacheInner>,
}

impl BannerCache {
    /// Create a cache. `default_ttl: None` means entries never expire by age;
    /// `sweep_interval: Some(_)` spawns the periodic sweep task on the
    /// current tokio runtime. The task stops when [`shutdown`] is called or
    /// when the last handle is dropped.
    ///
    /// [`shutdown`]: BannerCache::shutdown
    pub fn new(default_ttl: Option<Duration>, sweep_interval: Option<Duration>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(CacheInner {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            global_hits: AtomicU64::new(0),
            shutdown,
        });

        if let Some(interval) = sweep_interval.filter(|i| !i.is_zero()) {
            spawn_sweeper(&inner, interval);
        }

        Self { inner }
    }

    /// Insert or refresh the entry for `key`.
    ///
    /// A refresh replaces the payload and restarts the TTL but keeps the
    /// accumulated hit count: the key is still hot. Inserts count toward the
    /// window traffic total just like reads. When the map reaches
    /// `SIZE_TRIGGER` entries a sweep pass runs before returning, so a write
    /// burst cannot grow the cache unchecked between timer ticks.
    pub fn insert(&self, key: CacheKey, is_active: bool, payload: HashMap<String, String>) {
        let expires_at = self.inner.default_ttl.map(|ttl| Instant::now() + ttl);
        let over_trigger = {
            let mut entries = self.inner.write_entries();
            self.inner.global_hits.fetch_add(1, Ordering::Relaxed);
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.payload = payload;
                    entry.is_active = is_active;
                    entry.expires_at = expires_at;
                }
                None => {
                    entries.insert(
                        key,
                        CacheEntry {
                            payload,
                            is_active,
                            expires_at,
                            hit_count: AtomicU64::new(1),
                        },
                    );
                }
            }
            entries.len() >= SIZE_TRIGGER
        };

        if over_trigger {
            self.inner.sweep();
        }
    }

    /// Look up `key`, returning the payload and its active flag.
    ///
    /// An expired entry reads as a miss but is left in place; removal is the
    /// sweep's job, which keeps this path on the shared lock. A live hit
    /// bumps the entry's hit count and the window total. The counters are
    /// atomics, so concurrent readers never lose increments even though none
    /// of them holds the lock exclusively.
    pub fn get(&self, key: &CacheKey) -> Option<(HashMap<String, String>, bool)> {
        let entries = self.inner.read_entries();
        let entry = entries.get(key)?;

        if let Some(expires_at) = entry.expires_at {
            if Instant::now() > expires_at {
                return None;
            }
        }

        entry.hit_count.fetch_add(1, Ordering::Relaxed);
        self.inner.global_hits.fetch_add(1, Ordering::Relaxed);

        Some((entry.payload.clone(), entry.is_active))
    }

    /// Remove every listed key. Absent keys are skipped; an empty slice is a
    /// no-op. Once this returns, no later [`get`] on this instance observes a
    /// removed entry.
    ///
    /// [`get`]: BannerCache::get
    pub fn invalidate(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        let mut entries = self.inner.write_entries();
        for key in keys {
            if entries.remove(key).is_some() {
                debug!(
                    feature_id = key.feature_id,
                    tag_id = key.tag_id,
                    "invalidated cache entry"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of entry count and window traffic, for health reporting
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            window_hits: self.inner.global_hits.load(Ordering::Relaxed),
        }
    }

    /// Stop the background sweep task. Entries remain readable; only the
    /// periodic eviction ends. Dropping every handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }
}

impl CacheInner {
    // A poisoned lock only means some other thread panicked mid-operation;
    // the map itself is still usable, so recover the guard.
    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// One full eviction pass.
    ///
    /// Evicts entries whose TTL has passed and entries below the relative
    /// heat threshold, with the denominator captured before the window
    /// resets. Zero window traffic evicts everything: no entry confirmed any
    /// activity. Surviving entries restart at zero hits; hot status is
    /// re-earned every window.
    fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.write_entries();
        let window_hits = self.global_hits.swap(0, Ordering::Relaxed);
        let before = entries.len();

        entries.retain(|_, entry| {
            if entry.expires_at.is_some_and(|at| now > at) {
                return false;
            }
            let hits = entry.hit_count.swap(0, Ordering::Relaxed);
            window_hits > 0 && hits as f64 / window_hits as f64 >= MIN_HEAT
        });

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(
                evicted,
                retained = entries.len(),
                window_hits,
                "sweep evicted entries"
            );
        }
    }
}

/// Spawn the periodic sweep task.
///
/// The task holds only a weak reference, so it cannot keep the cache alive.
/// It exits when the shutdown flag is raised, when every strong handle is
/// gone, or when the process ends.
fn spawn_sweeper(inner: &Arc<CacheInner>, interval: Duration) {
    let weak = Arc::downgrade(inner);
    let mut shutdown = inner.shutdown.subscribe();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // interval fires immediately; skip the tick at t=0
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("sweep task stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kv: &[(&str, &str)]) -> HashMap<String, String> {
        kv.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn get_returns_inserted_payload() {
        let cache = BannerCache::new(Some(Duration::from_secs(60)), None);
        let key = CacheKey::new(1, 2);
        cache.insert(key, true, payload(&[("title", "sale"), ("url", "/sale")]));

        let (content, is_active) = cache.get(&key).expect("entry should be cached");
        assert_eq!(content["title"], "sale");
        assert_eq!(content["url"], "/sale");
        assert!(is_active);
    }

    #[test]
    fn get_on_absent_key_misses() {
        let cache = BannerCache::new(None, None);
        assert!(cache.get(&CacheKey::new(9, 9)).is_none());
    }

    #[test]
    fn refresh_replaces_payload_and_activity() {
        let cache = BannerCache::new(None, None);
        let key = CacheKey::new(1, 2);
        cache.insert(key, true, payload(&[("title", "old")]));
        cache.insert(key, false, payload(&[("title", "new")]));

        let (content, is_active) = cache.get(&key).expect("entry should be cached");
        assert_eq!(content["title"], "new");
        assert!(!is_active);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_reads_as_miss_without_removal() {
        let cache = BannerCache::new(Some(Duration::from_millis(1)), None);
        let key = CacheKey::new(1, 2);
        cache.insert(key, true, payload(&[("title", "stale")]));

        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get(&key).is_none());
        // removal is deferred to the sweep
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn sweep_task_removes_expired_entries() {
        let cache = BannerCache::new(
            Some(Duration::from_millis(1)),
            Some(Duration::from_millis(10)),
        );
        cache.insert(CacheKey::new(1, 1), true, payload(&[("title", "a")]));
        cache.insert(CacheKey::new(1, 2), true, payload(&[("title", "b")]));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.is_empty());
        cache.shutdown();
    }

    #[test]
    fn invalidate_removes_listed_keys() {
        let cache = BannerCache::new(None, None);
        let keep = CacheKey::new(1, 1);
        let drop_a = CacheKey::new(1, 2);
        let drop_b = CacheKey::new(2, 1);
        for key in [keep, drop_a, drop_b] {
            cache.insert(key, true, payload(&[("title", "x")]));
        }

        cache.invalidate(&[drop_a, drop_b]);

        assert!(cache.get(&drop_a).is_none());
        assert!(cache.get(&drop_b).is_none());
        assert!(cache.get(&keep).is_some());
    }

    #[test]
    fn invalidate_is_safe_on_missing_and_empty_keys() {
        let cache = BannerCache::new(None, None);
        let key = CacheKey::new(1, 1);
        cache.insert(key, true, payload(&[("title", "x")]));

        cache.invalidate(&[]);
        cache.invalidate(&[CacheKey::new(404, 404)]);

        assert!(cache.get(&key).is_some());
    }

    /// Twenty keys inserted once each, two of them read 50 times. The insert
    /// that brings the map to the size trigger runs a sweep over 120 window
    /// hits: the two hot keys clear the 20% share, the cold ones do not.
    #[test]
    fn sweep_evicts_cold_entries_relative_to_traffic() {
        let cache = BannerCache::new(None, None);
        let hot_q = CacheKey::new(100, 1);
        let hot_r = CacheKey::new(100, 2);

        cache.insert(hot_q, true, payload(&[("title", "q")]));
        cache.insert(hot_r, true, payload(&[("title", "r")]));
        for tag in 0..17 {
            cache.insert(CacheKey::new(1, tag), true, payload(&[("title", "cold")]));
        }

        for _ in 0..50 {
            assert!(cache.get(&hot_q).is_some());
            assert!(cache.get(&hot_r).is_some());
        }

        // 20th entry trips the size trigger and forces the sweep
        cache.insert(CacheKey::new(2, 0), true, payload(&[("title", "last")]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&hot_q).is_some());
        assert!(cache.get(&hot_r).is_some());
        assert!(cache.get(&CacheKey::new(1, 0)).is_none());
        assert!(cache.get(&CacheKey::new(2, 0)).is_none());
    }

    /// Refreshing a key keeps its accumulated hits, so a hot key stays hot
    /// through a re-populate.
    #[test]
    fn refresh_keeps_accumulated_heat() {
        let cache = BannerCache::new(None, None);
        let hot = CacheKey::new(100, 1);

        cache.insert(hot, true, payload(&[("title", "v1")]));
        for tag in 0..18 {
            cache.insert(CacheKey::new(1, tag), true, payload(&[("title", "cold")]));
        }
        for _ in 0..50 {
            assert!(cache.get(&hot).is_some());
        }
        cache.insert(hot, true, payload(&[("title", "v2")]));

        // trigger the sweep; hot carries 51 hits into a 71-hit window
        cache.insert(CacheKey::new(2, 0), true, payload(&[("title", "last")]));

        let (content, _) = cache.get(&hot).expect("hot key should survive the sweep");
        assert_eq!(content["title"], "v2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_readers_and_writers_keep_the_map_intact() {
        let cache = BannerCache::new(None, None);
        let mut handles = Vec::new();

        for feature in 0..4i64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for tag in 0..50i64 {
                    cache.insert(
                        CacheKey::new(feature, tag),
                        true,
                        payload(&[("slot", &tag.to_string())]),
                    );
                }
            }));
        }
        for reader in 0..4i64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200i64 {
                    let _ = cache.get(&CacheKey::new((reader + i) % 4, i % 50));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("cache task should not panic");
        }

        // never more entries than were inserted; sweeps may have evicted some
        assert!(cache.len() <= 200);
    }
}

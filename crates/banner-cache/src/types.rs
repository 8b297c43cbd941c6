//! Cache types

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use serde::Serialize;

/// Identity of one cached banner: the (feature, tag) pair it is served for.
///
/// Two logically equal pairs always compare and hash identically, so a pair
/// maps to exactly one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub feature_id: i64,
    pub tag_id: i64,
}

impl CacheKey {
    pub fn new(feature_id: i64, tag_id: i64) -> Self {
        Self { feature_id, tag_id }
    }
}

/// One cached banner. The payload is opaque to the cache.
pub(crate) struct CacheEntry {
    pub payload: HashMap<String, String>,
    pub is_active: bool,
    /// `None` means no TTL; the entry is subject to frequency eviction only.
    pub expires_at: Option<Instant>,
    /// Successful reads since the last sweep reset.
    pub hit_count: AtomicU64,
}

/// Point-in-time view of the cache, for health reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Reads and inserts observed in the current sweep window
    pub window_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_pairs_share_one_slot() {
        let a = CacheKey::new(7, 42);
        let b = CacheKey::new(7, 42);
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, "first");
        map.insert(b, "second");
        assert_eq!(map.len(), 1);
        assert_eq!(map[&CacheKey::new(7, 42)], "second");
    }

    #[test]
    fn distinct_pairs_do_not_collide() {
        assert_ne!(CacheKey::new(1, 2), CacheKey::new(2, 1));
        assert_ne!(CacheKey::new(1, 2), CacheKey::new(1, 3));
    }

    #[test]
    fn stats_default_is_empty() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.window_hits, 0);
    }
}

//! In-memory banner cache keyed by (feature, tag) pairs
//!
//! Serves read traffic ahead of the relational store. Entries expire by TTL
//! and by a windowed relative-frequency sweep: an entry survives a sweep only
//! if it accounted for at least a fifth of all cache traffic since the last
//! one. The cache holds derived state only; losing it costs latency, never
//! correctness.

mod cache;
mod types;

pub use cache::BannerCache;
pub use types::{CacheKey, CacheStats};

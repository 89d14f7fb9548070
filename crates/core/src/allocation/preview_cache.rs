//! Short-lived memo of allocation previews keyed by request.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

use super::{AllocationPreview, AllocationRequest};
use crate::constants::PREVIEW_CACHE_TTL;

#[derive(Debug, Clone)]
struct CachedPreview {
    preview: AllocationPreview,
    inserted_at: Instant,
}

/// Concurrent preview cache with a fixed time-to-live.
///
/// Shared by reference (`Arc`) between the services that generate previews.
#[derive(Debug)]
pub struct AllocationPreviewCache {
    entries: DashMap<String, CachedPreview>,
    ttl: Duration,
}

impl Default for AllocationPreviewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationPreviewCache {
    pub fn new() -> Self {
        Self::with_ttl(PREVIEW_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a fresh cached preview for the request, evicting a stale one.
    pub fn get(&self, request: &AllocationRequest) -> Option<AllocationPreview> {
        let key = request.cache_key();
        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.preview.clone());
            }
        } else {
            return None;
        }
        // The shard read guard must be released before removing.
        debug!("Evicting stale allocation preview {}", key);
        self.entries.remove(&key);
        None
    }

    pub fn insert(&self, request: &AllocationRequest, preview: AllocationPreview) {
        self.entries.insert(
            request.cache_key(),
            CachedPreview {
                preview,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, request: &AllocationRequest) {
        self.entries.remove(&request.cache_key());
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, cached| cached.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationConstraints;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn request(strategies: &[&str]) -> AllocationRequest {
        AllocationRequest {
            strategy_ids: strategies.iter().map(|s| s.to_string()).collect(),
            total_investment: dec!(10000),
            constraints: AllocationConstraints::new(dec!(50), dec!(100)),
            excluded_stock_ids: vec![],
        }
    }

    fn preview() -> AllocationPreview {
        AllocationPreview {
            total_investment: dec!(10000),
            allocations: vec![],
            unallocated_cash: dec!(10000),
            total_allocated: Decimal::ZERO,
            constraints: AllocationConstraints::new(dec!(50), dec!(100)),
            warnings: vec![],
        }
    }

    #[test]
    fn returns_cached_preview_for_equivalent_request() {
        let cache = AllocationPreviewCache::new();
        cache.insert(&request(&["a", "b"]), preview());

        assert_eq!(cache.get(&request(&["b", "a"])), Some(preview()));
        assert_eq!(cache.get(&request(&["a"])), None);
        assert_eq!(cache.ttl(), PREVIEW_CACHE_TTL);
    }

    #[test]
    fn expired_entries_are_ignored_and_evicted() {
        let cache = AllocationPreviewCache::with_ttl(Duration::ZERO);
        cache.insert(&request(&["a"]), preview());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get(&request(&["a"])), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_and_invalidate() {
        let cache = AllocationPreviewCache::with_ttl(Duration::ZERO);
        cache.insert(&request(&["a"]), preview());
        cache.insert(&request(&["b"]), preview());
        assert_eq!(cache.purge_expired(), 2);

        let cache = AllocationPreviewCache::new();
        cache.insert(&request(&["a"]), preview());
        cache.invalidate(&request(&["a"]));
        assert!(cache.is_empty());
    }
}

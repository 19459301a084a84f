use std::time::Instant;

/// A cached value with its bookkeeping. Owned by the cache; removed on TTL
/// expiry, explicit invalidation, or LRU pressure.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(value: T, ttl: std::time::Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            last_accessed: now,
            access_count: 0,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

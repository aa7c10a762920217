//! Konform Ledger: Idempotency Cache
//!
//! Bounded LRU keyed by the fix-request digest (user, issue set, company
//! profile), 24 h TTL. The persistent store's unique idempotency key stays
//! authoritative; this cache is the fast path.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 4096;
/// The idempotency window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CachedFixes {
    fix_ids: Vec<Uuid>,
    stored_at: Instant,
}

/// Bounded TTL cache of recent fix generations.
pub struct IdempotencyCache {
    entries: Mutex<LruCache<String, CachedFixes>>,
    ttl: Duration,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl IdempotencyCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached fix ids for a key, unless the window has passed.
    pub fn get(&self, key: &str) -> Option<Vec<Uuid>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => Some(cached.fix_ids.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, fix_ids: Vec<Uuid>) {
        self.entries.lock().put(
            key,
            CachedFixes {
                fix_ids,
                stored_at: Instant::now(),
            },
        );
    }
}

impl std::fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("len", &self.entries.lock().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

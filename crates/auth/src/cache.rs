//! Per-user cache of effective permission sets.
//!
//! Entries are invalidated explicitly when grants change; the TTL only bounds
//! how long a missed invalidation can linger.
//!
//! Readers fill the cache after a store read, so a fill can race with an
//! invalidation. Every invalidation bumps a generation counter; a reader
//! captures the generation before reading the store and the fill is dropped
//! if it moved in between.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use xadmin_core::UserId;

use crate::permissions::PermissionSet;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

pub trait PermissionCache: Send + Sync {
    fn get(&self, user_id: UserId) -> Option<Arc<PermissionSet>>;
    /// Current invalidation generation; capture it before computing a set.
    fn generation(&self) -> u64;
    /// Store `permissions` unless an invalidation happened since
    /// `generation` was captured.
    fn insert(&self, user_id: UserId, permissions: Arc<PermissionSet>, generation: u64);
    fn invalidate(&self, user_id: UserId);
    fn invalidate_all(&self);
}

impl<S> PermissionCache for Arc<S>
where
    S: PermissionCache + ?Sized,
{
    fn get(&self, user_id: UserId) -> Option<Arc<PermissionSet>> {
        (**self).get(user_id)
    }

    fn generation(&self) -> u64 {
        (**self).generation()
    }

    fn insert(&self, user_id: UserId, permissions: Arc<PermissionSet>, generation: u64) {
        (**self).insert(user_id, permissions, generation)
    }

    fn invalidate(&self, user_id: UserId) {
        (**self).invalidate(user_id)
    }

    fn invalidate_all(&self) {
        (**self).invalidate_all()
    }
}

#[derive(Debug, Default)]
struct Entries {
    generation: u64,
    sets: HashMap<UserId, (Instant, Arc<PermissionSet>)>,
}

/// In-process cache with a per-entry TTL.
#[derive(Debug)]
pub struct InMemoryPermissionCache {
    ttl: Duration,
    inner: RwLock<Entries>,
}

impl InMemoryPermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Entries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|e| e.sets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl PermissionCache for InMemoryPermissionCache {
    fn get(&self, user_id: UserId) -> Option<Arc<PermissionSet>> {
        let entries = self.inner.read().ok()?;
        let (stored_at, set) = entries.sets.get(&user_id)?;
        if stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(Arc::clone(set))
    }

    // A poisoned lock reports a generation no fill can match, so nothing is
    // cached until the process restarts.
    fn generation(&self) -> u64 {
        self.inner.read().map(|e| e.generation).unwrap_or(u64::MAX)
    }

    fn insert(&self, user_id: UserId, permissions: Arc<PermissionSet>, generation: u64) {
        let Ok(mut entries) = self.inner.write() else {
            return;
        };
        if entries.generation != generation {
            tracing::debug!(%user_id, "dropping permission set computed before an invalidation");
            return;
        }
        let ttl = self.ttl;
        entries.sets.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.sets.insert(user_id, (Instant::now(), permissions));
    }

    fn invalidate(&self, user_id: UserId) {
        if let Ok(mut entries) = self.inner.write() {
            entries.generation = entries.generation.wrapping_add(1);
            entries.sets.remove(&user_id);
        }
    }

    fn invalidate_all(&self) {
        if let Ok(mut entries) = self.inner.write() {
            entries.generation = entries.generation.wrapping_add(1);
            entries.sets.clear();
        }
    }
}

/// Cache that never holds anything; every check recomputes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPermissionCache;

impl PermissionCache for NoPermissionCache {
    fn get(&self, _user_id: UserId) -> Option<Arc<PermissionSet>> {
        None
    }

    fn generation(&self) -> u64 {
        0
    }

    fn insert(&self, _user_id: UserId, _permissions: Arc<PermissionSet>, _generation: u64) {}

    fn invalidate(&self, _user_id: UserId) {}

    fn invalidate_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionEntry;

    fn set() -> Arc<PermissionSet> {
        Arc::new(PermissionSet::from_entries([PermissionEntry::new("api/a", "GET")]))
    }

    #[test]
    fn insert_then_get() {
        let cache = InMemoryPermissionCache::default();
        let user = UserId::new();
        assert!(cache.get(user).is_none());
        cache.insert(user, set(), cache.generation());
        assert_eq!(cache.get(user).map(|s| s.len()), Some(1));
    }

    #[test]
    fn invalidate_single_and_all() {
        let cache = InMemoryPermissionCache::default();
        let (a, b) = (UserId::new(), UserId::new());
        cache.insert(a, set(), cache.generation());
        cache.insert(b, set(), cache.generation());

        cache.invalidate(a);
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = InMemoryPermissionCache::new(Duration::ZERO);
        let user = UserId::new();
        cache.insert(user, set(), cache.generation());
        assert!(cache.get(user).is_none());
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = NoPermissionCache;
        let user = UserId::new();
        cache.insert(user, set(), cache.generation());
        assert!(cache.get(user).is_none());
    }

    #[test]
    fn fill_racing_an_invalidation_is_dropped() {
        let cache = InMemoryPermissionCache::default();
        let user = UserId::new();

        // Reader misses and captures the generation before its store read.
        assert!(cache.get(user).is_none());
        let seen = cache.generation();

        // A grant edit lands while the reader is still computing.
        cache.invalidate(user);
        cache.insert(user, set(), seen);
        assert!(cache.get(user).is_none());

        // The next reader starts after the edit and may fill.
        cache.insert(user, set(), cache.generation());
        assert!(cache.get(user).is_some());
    }

    #[test]
    fn flush_also_voids_fills_for_other_users() {
        let cache = InMemoryPermissionCache::default();
        let user = UserId::new();
        let seen = cache.generation();
        cache.invalidate_all();
        cache.insert(user, set(), seen);
        assert!(cache.is_empty());
    }
}

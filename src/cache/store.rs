//! Bounded LRU storage with a busy-aware eviction rule
//!
//! When the store is full only the least recently used entry is considered for
//! eviction. If its token is still claimed by a live bundle the new entry is
//! turned away instead of scanning for another victim, keeping every operation
//! O(1).

use crate::cache::types::{Identity, Token};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

/// A resident value together with the token it was cached under
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub token: Token,
    pub value: V,
}

/// Outcome of [`LruStore::put`]. Displaced values are handed back so the
/// caller can release them once they are out of reach of other threads.
#[derive(Debug)]
#[must_use]
pub enum Admission<V> {
    /// The identity was resident; its entry was overwritten
    Updated { previous: CacheEntry<V> },

    /// Stored in a free slot
    Inserted,

    /// Stored after evicting the least recently used entry
    Evicted { identity: Identity, value: V },

    /// Dropped: the eviction candidate's token is busy
    Busy { value: V },
}

pub struct LruStore<V> {
    entries: LruCache<Identity, CacheEntry<V>>,
    capacity: NonZeroUsize,
    evictions: u64,
    in_use_evictions: u64,
}

impl<V> LruStore<V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            // The store enforces capacity itself so the busy rule decides evictions.
            entries: LruCache::unbounded(),
            capacity,
            evictions: 0,
            in_use_evictions: 0,
        }
    }

    /// Look up an entry, marking it most recently used on a hit
    pub fn get(&mut self, identity: &Identity) -> Option<&CacheEntry<V>> {
        self.entries.get(identity)
    }

    /// Store `value` for `identity`, evicting the tail entry if needed and allowed
    pub fn put<F>(
        &mut self,
        identity: Identity,
        token: Token,
        value: V,
        is_busy: F,
    ) -> Admission<V>
    where
        F: Fn(&Token) -> bool,
    {
        if let Some(entry) = self.entries.get_mut(&identity) {
            let previous = std::mem::replace(entry, CacheEntry { token, value });
            return Admission::Updated { previous };
        }

        if self.entries.len() < self.capacity.get() {
            self.entries.put(identity, CacheEntry { token, value });
            return Admission::Inserted;
        }

        if let Some((victim, entry)) = self.entries.peek_lru() {
            if is_busy(&entry.token) {
                debug!("Eviction candidate {} is in use, dropping {}", victim, identity);
                self.in_use_evictions += 1;
                return Admission::Busy { value };
            }
        }

        let Some((victim, evicted)) = self.entries.pop_lru() else {
            // Unreachable with capacity >= 1, but inserting is still correct.
            self.entries.put(identity, CacheEntry { token, value });
            return Admission::Inserted;
        };
        debug!("Evicted {} to make room for {}", victim, identity);
        self.entries.put(identity, CacheEntry { token, value });
        self.evictions += 1;

        Admission::Evicted {
            identity: victim,
            value: evicted.value,
        }
    }

    /// Detach an entry
    pub fn remove(&mut self, identity: &Identity) -> Option<CacheEntry<V>> {
        self.entries.pop(identity)
    }

    /// Detach every entry, least recently used first
    pub fn drain(&mut self) -> Vec<(Identity, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((identity, entry)) = self.entries.pop_lru() {
            drained.push((identity, entry.value));
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn in_use_evictions(&self) -> u64 {
        self.in_use_evictions
    }
}

//! Bundle-aware side input cache
//!
//! Combines the token registry with the LRU store behind the operations a
//! bundle lifecycle needs:
//! - bundle start registers the tokens the runner sent ([`SideInputCache::set_valid_tokens`])
//! - during the bundle, values are looked up ([`SideInputCache::query_cache`])
//!   and offered after a miss ([`SideInputCache::set_cache`])
//! - bundle completion drops its claims ([`SideInputCache::complete_bundle`])
//!
//! Nothing here fails once the cache is constructed. A value that cannot be
//! cached is simply not cached, and a value that cannot be trusted is simply
//! not returned.

use crate::cache::{
    config::CacheConfig,
    registry::TokenRegistry,
    reusable::ReusableInput,
    store::{Admission, CacheEntry, LruStore},
    token::{side_input_claims, CacheToken},
    types::{CacheStats, Identity, Token},
};
use crate::error::{CacheError, Result};
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SideInputCache<R: ReusableInput> {
    config: CacheConfig,

    /// Registry and store share one critical section
    inner: Mutex<Inner<R>>,

    /// Updated after the lock is released, hence atomic
    release_failures: AtomicU64,
}

struct Inner<R> {
    registry: TokenRegistry,
    store: LruStore<Arc<R>>,

    /// Values replaced while their token was claimed, reset once it goes idle
    retired: Vec<(Identity, CacheEntry<Arc<R>>)>,

    hits: u64,
    misses: u64,
    stale_reads: u64,
    invalidations: u64,
}

impl<R: ReusableInput> SideInputCache<R> {
    /// Create a cache holding at most `capacity` side inputs
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(CacheConfig::with_capacity(capacity))
    }

    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.capacity).ok_or_else(|| {
            CacheError::InvalidConfiguration("capacity must be at least 1".to_string())
        })?;

        info!("Initializing side input cache with config: {:?}", config);

        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                registry: TokenRegistry::new(),
                store: LruStore::new(capacity),
                retired: Vec::new(),
                hits: 0,
                misses: 0,
                stale_reads: 0,
                invalidations: 0,
            }),
            release_failures: AtomicU64::new(0),
        })
    }

    /// Register the tokens of a bundle that is starting.
    ///
    /// Records other than side input tokens are ignored.
    pub fn set_valid_tokens(&self, records: &[CacheToken]) {
        let claims = side_input_claims(records);
        if claims.is_empty() {
            return;
        }

        debug!("Registering {} side input tokens", claims.len());
        self.inner.lock().registry.register_bundle(claims);
    }

    /// Drop the claims of a bundle that has completed.
    ///
    /// Replaced values whose token is no longer claimed are reset here.
    pub fn complete_bundle(&self, records: &[CacheToken]) {
        let claims = side_input_claims(records);
        if claims.is_empty() {
            return;
        }

        debug!("Releasing {} side input tokens", claims.len());
        let idle = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.registry.release_bundle(claims);

            let registry = &inner.registry;
            let (idle, busy): (Vec<_>, Vec<_>) = inner
                .retired
                .drain(..)
                .partition(|(_, entry)| !registry.is_busy(&entry.token));
            inner.retired = busy;
            idle
        };

        for (identity, entry) in idle {
            self.release(&identity, entry.value);
        }
    }

    /// Offer a materialized side input to the cache.
    ///
    /// The offer is dropped when no token is registered for the pair, or when
    /// the cache is full and its least recently used entry is still in use.
    pub fn set_cache(&self, transform_id: &str, side_input_id: &str, value: Arc<R>) {
        let identity = Identity::new(transform_id, side_input_id);
        let offered = Arc::clone(&value);

        let admission = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let Some(token) = inner.registry.current_token(&identity).cloned() else {
                debug!("No token registered for {}, not caching", identity);
                return;
            };

            let registry = &inner.registry;
            let admission = inner
                .store
                .put(identity.clone(), token, value, |t| registry.is_busy(t));

            // A value offered again is live, not waiting for release.
            if !matches!(admission, Admission::Busy { .. }) {
                inner.retired.retain(|(_, entry)| !Arc::ptr_eq(&entry.value, &offered));
            }

            // A replaced value may still be read by a bundle claiming its token.
            match admission {
                Admission::Updated { previous } if registry.is_busy(&previous.token) => {
                    debug!("Replaced cached value for {} while in use", identity);
                    if !Arc::ptr_eq(&previous.value, &offered) {
                        inner.retired.push((identity, previous));
                    }
                    return;
                }
                admission => admission,
            }
        };

        match admission {
            Admission::Inserted => debug!("Cached {}", identity),
            Admission::Updated { previous } => {
                debug!("Replaced cached value for {}", identity);
                if !Arc::ptr_eq(&previous.value, &offered) {
                    self.release(&identity, previous.value);
                }
            }
            Admission::Evicted { identity: victim, value } => self.release(&victim, value),
            Admission::Busy { .. } => {
                debug!("Cache full of in-use entries, not caching {}", identity)
            }
        }
    }

    /// Look up a cached side input.
    ///
    /// A value cached under a token that has since been superseded is never
    /// returned.
    pub fn query_cache(&self, transform_id: &str, side_input_id: &str) -> Option<Arc<R>> {
        let identity = Identity::new(transform_id, side_input_id);

        let mut stale = None;
        let found = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let lookup = inner
                .store
                .get(&identity)
                .map(|entry| (entry.token.clone(), Arc::clone(&entry.value)));

            match lookup {
                None => {
                    inner.misses += 1;
                    debug!("Cache miss: {}", identity);
                    None
                }
                Some((token, value)) if inner.registry.current_token(&identity) == Some(&token) => {
                    inner.hits += 1;
                    debug!("Cache hit: {}", identity);
                    Some(value)
                }
                Some((token, _)) => {
                    inner.misses += 1;
                    inner.stale_reads += 1;
                    debug!(
                        "Cached value for {} was built under superseded token {}",
                        identity, token
                    );

                    if self.config.evict_stale_on_read && !inner.registry.is_busy(&token) {
                        stale = inner.store.remove(&identity).map(|entry| entry.value);
                        if stale.is_some() {
                            inner.invalidations += 1;
                        }
                    }
                    None
                }
            }
        };

        if let Some(value) = stale {
            self.release(&identity, value);
        }

        found
    }

    /// Release every cached value. Token registrations are kept.
    pub fn clear(&self) {
        let drained = Self::detach_all(&mut self.inner.lock());
        let count = drained.len();

        for (identity, value) in drained {
            self.release(&identity, value);
        }

        info!("Cleared {} entries from side input cache", count);
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            stale_reads: inner.stale_reads,
            evictions: inner.store.evictions(),
            in_use_evictions: inner.store.in_use_evictions(),
            invalidations: inner.invalidations,
            release_failures: self.release_failures.load(Ordering::Relaxed),
            entries: inner.store.len(),
            capacity: inner.store.capacity(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// The token currently authoritative for a (transform, side input) pair
    pub fn current_token(&self, transform_id: &str, side_input_id: &str) -> Option<Token> {
        let identity = Identity::new(transform_id, side_input_id);
        self.inner.lock().registry.current_token(&identity).cloned()
    }

    pub fn is_token_known(&self, token: &Token) -> bool {
        self.inner.lock().registry.is_known(token)
    }

    pub fn is_token_busy(&self, token: &Token) -> bool {
        self.inner.lock().registry.is_busy(token)
    }

    /// Number of replaced values still waiting for their token to go idle
    pub fn pending_releases(&self) -> usize {
        self.inner.lock().retired.len()
    }

    fn detach_all(inner: &mut Inner<R>) -> Vec<(Identity, Arc<R>)> {
        let mut drained = inner.store.drain();
        drained.extend(
            inner
                .retired
                .drain(..)
                .map(|(identity, entry)| (identity, entry.value)),
        );
        drained
    }

    /// Reset a value that is no longer reachable through the cache.
    /// Must be called without holding the lock.
    fn release(&self, identity: &Identity, value: Arc<R>) {
        if let Err(e) = value.reset() {
            self.release_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to release cached side input {}: {}", identity, e);
        }
    }
}

impl<R: ReusableInput> Drop for SideInputCache<R> {
    fn drop(&mut self) {
        let drained = Self::detach_all(self.inner.get_mut());
        for (identity, value) in drained {
            self.release(&identity, value);
        }
    }
}

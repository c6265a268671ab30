//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a cached side input: the transform that consumes it plus the
/// side input's local name within that transform.
///
/// Both parts are kept as separate fields, so `("ab", "c")` and `("a", "bc")`
/// never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    transform_id: String,
    side_input_id: String,
}

impl Identity {
    /// Compose the identity of a (transform, side input) pair
    pub fn new(transform_id: impl Into<String>, side_input_id: impl Into<String>) -> Self {
        Self {
            transform_id: transform_id.into(),
            side_input_id: side_input_id.into(),
        }
    }

    pub fn transform_id(&self) -> &str {
        &self.transform_id
    }

    pub fn side_input_id(&self) -> &str {
        &self.side_input_id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transform_id, self.side_input_id)
    }
}

/// Opaque epoch marker issued by the runner. Equal tokens mean equal data.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(Vec<u8>);

impl Token {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Token {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for Token {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{s}"),
            _ => {
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Statistics exported for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Queries answered with a valid cached value
    pub hits: u64,

    /// Queries that found nothing usable (includes stale reads)
    pub misses: u64,

    /// Queries that found an entry cached under a superseded token
    pub stale_reads: u64,

    /// Entries reclaimed to make room for a new one
    pub evictions: u64,

    /// Offers dropped because the eviction candidate was still claimed by a bundle
    pub in_use_evictions: u64,

    /// Stale entries removed on read
    pub invalidations: u64,

    /// Values whose reset failed while being released
    pub release_failures: u64,

    /// Number of entries currently in cache
    pub entries: usize,

    /// Configured maximum number of entries
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}/{}, \
             evictions: {}, in_use_evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.capacity,
            self.evictions,
            self.in_use_evictions
        )
    }
}

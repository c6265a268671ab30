//! Configuration for the side input cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the maximum number of cached side inputs
pub const CAPACITY_ENV: &str = "SIDE_INPUT_CACHE_CAPACITY";

/// Environment variable toggling eager removal of stale entries on read
pub const EVICT_STALE_ENV: &str = "SIDE_INPUT_CACHE_EVICT_STALE_ON_READ";

/// Configuration for the side input cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident side inputs. Must be at least 1.
    pub capacity: usize,

    /// Remove an entry as soon as a read finds its token superseded,
    /// provided no live bundle still claims the old token.
    pub evict_stale_on_read: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            evict_stale_on_read: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Configuration with the given capacity and default behaviour otherwise
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity < 1 {
            return Err(CacheError::InvalidConfiguration(format!(
                "capacity must be at least 1, got {}",
                self.capacity
            )));
        }

        Ok(())
    }

    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// Unset variables fall back to [`CacheConfig::default`]; set but
    /// unparseable variables are rejected.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(raw) = env::var(CAPACITY_ENV) {
            config.capacity = raw.trim().parse().map_err(|_| {
                CacheError::InvalidConfiguration(format!("{CAPACITY_ENV}={raw:?} is not a number"))
            })?;
        }

        if let Ok(raw) = env::var(EVICT_STALE_ENV) {
            config.evict_stale_on_read = parse_flag(&raw).ok_or_else(|| {
                CacheError::InvalidConfiguration(format!(
                    "{EVICT_STALE_ENV}={raw:?} is not a boolean"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    capacity: Option<usize>,
    evict_stale_on_read: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set maximum number of cached side inputs
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Enable or disable eager removal of stale entries
    pub fn evict_stale_on_read(mut self, enable: bool) -> Self {
        self.evict_stale_on_read = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            evict_stale_on_read: self
                .evict_stale_on_read
                .unwrap_or(defaults.evict_stale_on_read),
        }
    }
}

/// Preset configurations
impl CacheConfig {
    /// For workers with a handful of small side inputs
    pub fn small() -> Self {
        Self {
            capacity: 16,
            ..Default::default()
        }
    }

    /// For pipelines fanning many side inputs into each stage
    pub fn large() -> Self {
        Self {
            capacity: 10_000,
            ..Default::default()
        }
    }
}

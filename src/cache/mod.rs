//! # Side Input Cache
//!
//! Keeps materialized side inputs alive across bundles so a worker does not
//! rebuild them while the runner reports that the underlying data is unchanged.
//!
//! ## Features
//!
//! - **Token Validity**: values are only served while the runner's token for
//!   their (transform, side input) pair is the one they were cached under
//! - **Busy-Aware LRU**: the least recently used entry is evicted only if no
//!   live bundle still claims its token
//! - **Fail Open**: after construction nothing returns an error; an offer that
//!   cannot be stored or an entry that cannot be trusted is skipped
//! - **Metrics**: hits, misses, evictions and in-use eviction attempts
//!
//! ## Architecture
//!
//! - [`TokenRegistry`]: identity → current token, token → live bundle count
//! - [`LruStore`]: bounded recency-ordered storage
//! - [`SideInputCache`]: both of the above behind one mutex
//!
//! ## Example
//!
//! ```rust
//! use sideinput_cache::cache::{CacheToken, MaterializedInput, ReusableInput, SideInputCache};
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let cache = SideInputCache::new(100)?;
//!
//! // Bundle start
//! let tokens = vec![CacheToken::side_input("ParDo(Enrich)", "side0", "epoch-7")];
//! cache.set_valid_tokens(&tokens);
//!
//! if cache.query_cache("ParDo(Enrich)", "side0").is_none() {
//!     let lookup = Arc::new(MaterializedInput::new(vec!["a", "b"]));
//!     cache.set_cache("ParDo(Enrich)", "side0", lookup);
//! }
//!
//! let cached = cache.query_cache("ParDo(Enrich)", "side0").expect("cached");
//! assert_eq!(cached.value(), Some(vec!["a", "b"]));
//!
//! // Bundle completion
//! cache.complete_bundle(&tokens);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod config;
pub mod registry;
pub mod reusable;
pub mod side_input;
pub mod store;
pub mod token;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use registry::TokenRegistry;
pub use reusable::{MaterializedInput, ReusableInput};
pub use side_input::SideInputCache;
pub use store::{Admission, CacheEntry, LruStore};
pub use token::{CacheToken, CacheTokenKind};
pub use types::{CacheStats, Identity, Token};

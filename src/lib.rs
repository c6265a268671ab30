//! # sideinput-cache
//!
//! An in-process cache that lets a stream processing worker reuse materialized
//! side inputs across bundles.
//!
//! The runner attaches a cache token to every side input a bundle reads. An
//! unchanged token means unchanged data, so a value built under that token can
//! be served to later bundles instead of being rebuilt. The cache tracks which
//! token is current for each side input and how many running bundles still
//! claim each token; entries whose token is claimed are never evicted.
//!
//! ## Bundle lifecycle
//!
//! ```no_run
//! use sideinput_cache::{CacheConfig, CacheToken, MaterializedInput, SideInputCache};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache: SideInputCache<MaterializedInput<Vec<u8>>> =
//!         SideInputCache::with_config(CacheConfig::from_env()?)?;
//!
//!     let tokens = vec![
//!         CacheToken::side_input("transform-1", "side-1", b"token-a".to_vec()),
//!         CacheToken::user_state(b"state-token".to_vec()),
//!     ];
//!
//!     cache.set_valid_tokens(&tokens);
//!     let side = match cache.query_cache("transform-1", "side-1") {
//!         Some(side) => side,
//!         None => {
//!             let built = Arc::new(MaterializedInput::new(vec![1, 2, 3]));
//!             cache.set_cache("transform-1", "side-1", Arc::clone(&built));
//!             built
//!         }
//!     };
//!     // ... process the bundle using `side` ...
//!     # drop(side);
//!     cache.complete_bundle(&tokens);
//!
//!     println!("{}", cache.stats());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    Admission, CacheConfig, CacheConfigBuilder, CacheStats, CacheToken, CacheTokenKind,
    Identity, LruStore, MaterializedInput, ReusableInput, SideInputCache, Token, TokenRegistry,
};
pub use error::{CacheError, Result};

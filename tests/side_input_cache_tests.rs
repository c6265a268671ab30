//! Integration tests for the side input cache
//!
//! These tests drive the cache the way a worker does:
//! - bundle start / completion token handling
//! - offering and querying values
//! - eviction with and without in-use entries
//! - concurrent bundles sharing one cache

use sideinput_cache::{
    CacheError, CacheStats, CacheToken, MaterializedInput, ReusableInput, SideInputCache, Token,
};
use sideinput_cache::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread;
use std::time::Duration;

type IntCache = SideInputCache<MaterializedInput<i32>>;

fn input(v: i32) -> Arc<MaterializedInput<i32>> {
    Arc::new(MaterializedInput::new(v))
}

/// Token record for the n-th (transform, side input) pair
fn bundle_token(n: i32) -> CacheToken {
    CacheToken::side_input(format!("t{n}"), format!("s{n}"), format!("tok{n}"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_init_accepts_positive_capacity() {
    for capacity in [1, 2, 5, 1_000] {
        assert!(IntCache::new(capacity).is_ok());
    }
}

#[test]
fn test_init_rejects_zero_capacity() {
    let err = IntCache::new(0).err().expect("capacity 0 must be rejected");
    assert!(matches!(err, CacheError::InvalidConfiguration(_)));
}

#[test]
fn test_query_on_empty_cache_misses() {
    let cache = IntCache::new(1).unwrap();
    assert!(cache.query_cache("transform1", "side1").is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_set_cache_without_token_is_dropped() {
    let cache = IntCache::new(1).unwrap();
    cache.set_cache("t1", "s1", input(10));

    assert!(cache.query_cache("t1", "s1").is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_round_trip_after_registration() {
    init_tracing();
    let cache = IntCache::new(1).unwrap();
    cache.set_valid_tokens(&[CacheToken::side_input("t1", "s1", "tok1")]);

    cache.set_cache("t1", "s1", input(10));
    let output = cache
        .query_cache("t1", "s1")
        .expect("call to query cache missed when should have hit");
    assert_eq!(output.value(), Some(10));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
}

#[test]
fn test_fill_to_capacity_without_evicting() {
    let cache = IntCache::new(4).unwrap();
    for n in 0..4 {
        cache.set_valid_tokens(&[bundle_token(n)]);
        cache.set_cache(&format!("t{n}"), &format!("s{n}"), input(n));
    }

    let stats = cache.stats();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.evictions, 0);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_eviction_of_idle_entry() {
    let cache = IntCache::new(1).unwrap();

    let tok_one = [CacheToken::side_input("t1", "s1", "tok1")];
    let in_one = input(10);
    cache.set_valid_tokens(&tok_one);
    cache.set_cache("t1", "s1", Arc::clone(&in_one));
    // Mark bundle as complete, drop count for tok1 to 0
    cache.complete_bundle(&tok_one);

    cache.set_valid_tokens(&[CacheToken::side_input("t2", "s2", "tok2")]);
    cache.set_cache("t2", "s2", input(20));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions, 1);
    assert!(cache.query_cache("t1", "s1").is_none());
    assert_eq!(cache.query_cache("t2", "s2").unwrap().value(), Some(20));
    // The evicted value was released exactly when it left the cache
    assert!(in_one.is_reset());
}

#[test]
fn test_eviction_blocked_by_busy_entry() {
    let cache = IntCache::new(1).unwrap();

    cache.set_valid_tokens(&[
        CacheToken::side_input("t1", "s1", "tok1"),
        CacheToken::side_input("t2", "s2", "tok2"),
    ]);
    cache.set_cache("t1", "s1", input(10));
    // Should fail to evict because tok1 is still claimed
    let rejected = input(20);
    cache.set_cache("t2", "s2", Arc::clone(&rejected));

    assert_eq!(cache.len(), 1);
    let stats = cache.stats();
    assert_eq!(stats.in_use_evictions, 1);
    assert_eq!(stats.evictions, 0);
    assert_eq!(cache.query_cache("t1", "s1").unwrap().value(), Some(10));
    assert!(cache.query_cache("t2", "s2").is_none());
    // A rejected offer is not the cache's to release
    assert!(!rejected.is_reset());
}

#[test]
fn test_hits_refresh_recency() {
    let cache = IntCache::new(2).unwrap();
    let first = [
        CacheToken::side_input("t1", "s1", "tok1"),
        CacheToken::side_input("t2", "s2", "tok2"),
    ];
    cache.set_valid_tokens(&first);
    cache.set_cache("t1", "s1", input(1));
    cache.set_cache("t2", "s2", input(2));
    cache.complete_bundle(&first);

    // t1 becomes most recently used, so t2 is the one to go
    assert!(cache.query_cache("t1", "s1").is_some());

    cache.set_valid_tokens(&[CacheToken::side_input("t3", "s3", "tok3")]);
    cache.set_cache("t3", "s3", input(3));

    assert!(cache.query_cache("t1", "s1").is_some());
    assert!(cache.query_cache("t2", "s2").is_none());
    assert!(cache.query_cache("t3", "s3").is_some());
}

#[test]
fn test_superseded_token_is_never_served() {
    let cache = IntCache::new(2).unwrap();
    cache.set_valid_tokens(&[CacheToken::side_input("t1", "s1", "epoch-1")]);
    cache.set_cache("t1", "s1", input(1));

    cache.set_valid_tokens(&[CacheToken::side_input("t1", "s1", "epoch-2")]);
    assert!(cache.query_cache("t1", "s1").is_none());
    assert_eq!(cache.current_token("t1", "s1"), Some(Token::from("epoch-2")));
    // The first bundle has not completed, so the old epoch is still live
    assert!(cache.is_token_known(&Token::from("epoch-1")));
    assert!(cache.is_token_busy(&Token::from("epoch-1")));

    // Caching under the new epoch serves again
    cache.set_cache("t1", "s1", input(2));
    assert_eq!(cache.query_cache("t1", "s1").unwrap().value(), Some(2));
}

#[test]
fn test_balanced_register_release_leaves_token_known() {
    let cache = IntCache::new(1).unwrap();
    let record = [CacheToken::side_input("t1", "s1", "tok1")];
    let token = Token::from("tok1");

    for _ in 0..5 {
        cache.set_valid_tokens(&record);
    }
    assert!(cache.is_token_busy(&token));
    for _ in 0..5 {
        cache.complete_bundle(&record);
    }
    assert!(!cache.is_token_busy(&token));
    assert!(cache.is_token_known(&token));

    // Extra completions are tolerated
    cache.complete_bundle(&record);
    assert!(!cache.is_token_busy(&token));
}

#[test]
fn test_user_state_tokens_pass_through() {
    let cache = IntCache::new(1).unwrap();
    cache.set_valid_tokens(&[CacheToken::user_state("state")]);
    cache.set_cache("t1", "s1", input(1));
    assert!(cache.is_empty());
    assert!(!cache.is_token_known(&Token::from("state")));
}

/// A value whose release always fails
struct Leaky {
    resets: AtomicUsize,
}

impl ReusableInput for Leaky {
    type Output = ();

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn value(&self) {}

    fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::ReleaseFailure("file handle already closed".to_string()))
    }
}

#[test]
fn test_release_failure_does_not_block_eviction() {
    init_tracing();
    let cache = SideInputCache::new(1).unwrap();
    let first = [CacheToken::side_input("t1", "s1", "tok1")];
    cache.set_valid_tokens(&first);
    let leaky = Arc::new(Leaky {
        resets: AtomicUsize::new(0),
    });
    cache.set_cache("t1", "s1", Arc::clone(&leaky));
    cache.complete_bundle(&first);

    cache.set_valid_tokens(&[CacheToken::side_input("t2", "s2", "tok2")]);
    cache.set_cache(
        "t2",
        "s2",
        Arc::new(Leaky {
            resets: AtomicUsize::new(0),
        }),
    );

    assert_eq!(leaky.resets.load(Ordering::SeqCst), 1);
    assert!(cache.query_cache("t2", "s2").is_some());
    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.release_failures, 1);
    assert_eq!(stats.entries, 1);
}

/// A value whose release reads back from the cache holding it
#[derive(Default)]
struct Reentrant {
    cache: Mutex<Weak<SideInputCache<Reentrant>>>,
    seen: Mutex<Option<CacheStats>>,
}

impl ReusableInput for Reentrant {
    type Output = ();

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn value(&self) {}

    fn reset(&self) -> Result<()> {
        let cache = self.cache.lock().upgrade();
        if let Some(cache) = cache {
            *self.seen.lock() = Some(cache.stats());
        }
        Ok(())
    }
}

fn reentrant(cache: &Arc<SideInputCache<Reentrant>>) -> Arc<Reentrant> {
    let value = Arc::new(Reentrant::default());
    *value.cache.lock() = Arc::downgrade(cache);
    value
}

#[test]
fn test_reset_may_reenter_cache() {
    init_tracing();
    let (done, finished) = mpsc::channel();

    thread::spawn(move || {
        let cache = Arc::new(SideInputCache::new(1).unwrap());

        // Released by eviction
        let evicted = reentrant(&cache);
        let first = [CacheToken::side_input("t1", "s1", "tok1")];
        cache.set_valid_tokens(&first);
        cache.set_cache("t1", "s1", Arc::clone(&evicted));
        cache.complete_bundle(&first);

        let second = [CacheToken::side_input("t2", "s2", "tok2")];
        cache.set_valid_tokens(&second);
        let replaced = reentrant(&cache);
        cache.set_cache("t2", "s2", Arc::clone(&replaced));

        // Released once the claiming bundle completes
        cache.set_cache("t2", "s2", reentrant(&cache));
        cache.complete_bundle(&second);

        // Released by teardown
        let cleared = cache.query_cache("t2", "s2").unwrap();
        cache.clear();

        done.send((evicted, replaced, cleared)).unwrap();
    });

    let (evicted, replaced, cleared) = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("reset re-entering the cache deadlocked");

    let seen = evicted.seen.lock().clone().expect("eviction did not reset the value");
    assert_eq!(seen.evictions, 1);
    assert!(replaced.seen.lock().is_some());
    let seen = cleared.seen.lock().clone().expect("clear did not reset the value");
    assert_eq!(seen.entries, 0);
}

#[test]
fn test_stats_export() {
    let cache = IntCache::new(3).unwrap();
    cache.set_valid_tokens(&[CacheToken::side_input("t1", "s1", "tok1")]);
    cache.set_cache("t1", "s1", input(1));
    cache.query_cache("t1", "s1");
    cache.query_cache("t9", "s9");

    let stats = cache.stats();
    assert_eq!(stats.hit_rate(), 50.0);
    assert_eq!(stats.capacity, 3);

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"in_use_evictions\":0"));
    let back: CacheStats = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stats);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bundles() {
    init_tracing();
    let cache = Arc::new(IntCache::new(4).unwrap());
    let mut handles = Vec::new();

    for worker in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for round in 0..50 {
                let n = (worker + round) % 6;
                let (t, s) = (format!("t{n}"), format!("s{n}"));
                let tokens = vec![bundle_token(n)];

                cache.set_valid_tokens(&tokens);
                match cache.query_cache(&t, &s) {
                    Some(hit) => assert_eq!(hit.value(), Some(n)),
                    None => cache.set_cache(&t, &s, input(n)),
                }
                cache.complete_bundle(&tokens);
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats();
    assert!(stats.entries <= 4);
    assert_eq!(stats.hits + stats.misses, 8 * 50);
    for n in 0..6 {
        assert!(!cache.is_token_busy(&Token::from(format!("tok{n}"))));
    }
}

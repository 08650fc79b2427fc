//! Reference registry cache: single-flight loading and invalidation.

#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tessera_client::registry::{Actor, Provider};
use tessera_client::{EntityKind, RegistryCache, RegistryData, RegistryLoader};
use tessera_core::{ActorId, Error, ProviderId, Result};

#[derive(Default)]
struct CountingLoader {
    loads: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl RegistryLoader for CountingLoader {
    async fn load_registry(&self) -> Result<RegistryData> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                body: "registry unavailable".to_string(),
            });
        }
        Ok(RegistryData::from_lists(
            vec![Provider {
                id: ProviderId::new(1),
                name: format!("Archive (load {n})"),
                kind: None,
            }],
            vec![Actor {
                id: ActorId::new(2),
                name: "importer".to_string(),
            }],
        ))
    }
}

fn cache() -> (Arc<CountingLoader>, RegistryCache) {
    let loader = Arc::new(CountingLoader::default());
    let cache = RegistryCache::new(Arc::clone(&loader) as Arc<dyn RegistryLoader>);
    (loader, cache)
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_load() {
    let (loader, cache) = cache();

    let (a, b) = tokio::join!(cache.get(), cache.get());
    let a = a.expect("first caller");
    let b = b.expect("second caller");

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(a.label(EntityKind::Actor, 2), Some("importer"));
}

#[tokio::test(start_paused = true)]
async fn resolved_value_is_served_from_cache() {
    let (loader, cache) = cache();
    assert!(cache.cached().is_none());

    let first = cache.get().await.expect("load");
    let cached = cache.cached().expect("cached after load");
    let again = cache.get().await.expect("cached");

    assert!(Arc::ptr_eq(&first, &cached));
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_forces_exactly_one_new_load() {
    let (loader, cache) = cache();
    let before = cache.get().await.expect("load");

    cache.clear();
    assert!(cache.cached().is_none());

    let (after, other) = tokio::join!(cache.get(), cache.get());
    let after = after.expect("reload");
    assert!(Arc::ptr_eq(&after, &other.expect("reload")));
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(after.label(EntityKind::Provider, 1), Some("Archive (load 2)"));
}

#[tokio::test(start_paused = true)]
async fn clear_during_load_discards_the_old_result() {
    let (loader, cache) = cache();
    let cache = Arc::new(cache);

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.clear();

    pending.await.expect("join").expect("old waiter still resolves");
    assert!(cache.cached().is_none(), "stale generation is not stored");

    cache.get().await.expect("fresh load");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_reject_all_waiters_and_are_not_cached() {
    let (loader, cache) = cache();
    loader.fail.store(true, Ordering::SeqCst);

    let (a, b) = tokio::join!(cache.get(), cache.get());
    let err = a.expect_err("first waiter fails");
    assert_eq!(b.expect_err("second waiter fails"), err);
    assert_eq!(err.display_message(), "registry unavailable");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    loader.fail.store(false, Ordering::SeqCst);
    cache.get().await.expect("retry succeeds");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

//! Backend-agnostic conformance checks shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use yacache::{fetcher_fn, Cache, CacheError, Cacheable, Context, Fetcher, Key};

pub const HOUR: Duration = Duration::from_secs(3600);

/// Installs a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yacache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn value_fetcher(value: &'static str) -> impl Fetcher {
    fetcher_fn(move |_, _| async move { Ok(Cacheable::value(value, HOUR)) })
}

/// Fetcher returning "value" and counting its invocations.
pub fn counting_fetcher() -> (impl Fetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetcher = fetcher_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Cacheable::value("value", HOUR)) }
    });
    (fetcher, calls)
}

pub fn failing_fetcher() -> impl Fetcher {
    fetcher_fn(|_, key| async move { Err(anyhow::anyhow!("origin has no {key}")) })
}

// == Standard ==
/// Miss-then-hit, idempotent hit and delete semantics.
pub async fn standard(cache: &dyn Cache, key: &Key, key2: &Key) {
    let ctx = Context::new();
    let (fetcher, calls) = counting_fetcher();

    assert!(!cache.contains(&ctx, key).await.unwrap(), "{key} should not be cached");

    cache.put(&ctx, key, &fetcher).await.unwrap();
    assert!(cache.contains(&ctx, key).await.unwrap(), "{key} should be cached");
    assert!(!cache.contains(&ctx, key2).await.unwrap(), "{key2} should not be cached");

    let first = cache.get(&ctx, key2, &fetcher).await.unwrap();
    assert_eq!(first.value(), Some(&b"value"[..]));
    let second = cache.get(&ctx, key2, &fetcher).await.unwrap();
    assert_eq!(second.value(), Some(&b"value"[..]));
    // One call for the put, one for the first get of key2
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.delete(&ctx, key).await.unwrap();
    assert!(!cache.contains(&ctx, key).await.unwrap(), "{key} should be deleted");
    cache.delete(&ctx, key).await.unwrap();
}

// == Max Size ==
/// With a bound of 5: touch "10".."6", then "1".."10".
pub async fn max_size(cache: &dyn Cache) {
    let ctx = Context::new();
    let fetcher = value_fetcher("value");

    for i in (6..=10).rev() {
        cache.get(&ctx, &Key::new(i.to_string()), &fetcher).await.unwrap();
    }
    for i in 1..=10 {
        cache.get(&ctx, &Key::new(i.to_string()), &fetcher).await.unwrap();
    }

    for i in 1..=5 {
        let present = cache.contains(&ctx, &Key::new(i.to_string())).await.unwrap();
        assert!(!present, "unexpected key: {i}");
    }
    for i in 6..=10 {
        let present = cache.contains(&ctx, &Key::new(i.to_string())).await.unwrap();
        assert!(present, "expected key: {i}");
    }
}

// == Error Fetch ==
/// A failing fetcher leaves presence unchanged, whether or not the key existed.
pub async fn error_fetch_does_not_pollute(cache: &dyn Cache) {
    let ctx = Context::new();
    let absent = Key::from("never-fetched");
    let present = Key::from("already-cached");

    cache.put(&ctx, &present, &value_fetcher("kept")).await.unwrap();

    assert!(cache.get(&ctx, &absent, &failing_fetcher()).await.is_err());
    assert!(cache.put(&ctx, &absent, &failing_fetcher()).await.is_err());
    assert!(!cache.contains(&ctx, &absent).await.unwrap());

    let err = cache.put(&ctx, &present, &failing_fetcher()).await.unwrap_err();
    assert_eq!(err.to_string(), "origin has no already-cached");
    let item = cache.get(&ctx, &present, &failing_fetcher()).await.unwrap();
    assert_eq!(item.value(), Some(&b"kept"[..]));
}

// == Cancellation ==
/// A cancelled context fails every operation before the fetcher runs.
pub async fn cancelled_context_fails_fast(cache: &dyn Cache) {
    let ctx = Context::new();
    ctx.cancel();
    let key = Key::from("cancelled");
    let (fetcher, calls) = counting_fetcher();

    assert!(cache.get(&ctx, &key, &fetcher).await.is_err());
    assert!(cache.put(&ctx, &key, &fetcher).await.is_err());
    assert!(cache.contains(&ctx, &key).await.is_err());
    assert!(cache.delete(&ctx, &key).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!cache.contains(&Context::new(), &key).await.unwrap());
}

// == Cancellation While Queued ==
/// A caller cancelled while it waits behind a slow fetch never reaches its
/// own fetcher.
pub async fn cancelled_while_queued(cache: &dyn Cache) {
    let holder_ctx = Context::new();
    let waiter_ctx = Context::new();
    let slow = fetcher_fn(|_, _| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Cacheable::value("slow", HOUR))
    });
    let (fetcher, calls) = counting_fetcher();

    // The holder takes the instance lock on first poll; the waiter queues behind it
    let held_key = Key::from("held");
    let queued_key = Key::from("queued");
    let holder = cache.get(&holder_ctx, &held_key, &slow);
    let waiter = cache.get(&waiter_ctx, &queued_key, &fetcher);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waiter_ctx.cancel();
    };
    let (held, waited, ()) = tokio::join!(holder, waiter, canceller);

    assert_eq!(held.unwrap().value(), Some(&b"slow"[..]));
    assert!(matches!(waited, Err(CacheError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!cache.contains(&Context::new(), &Key::from("queued")).await.unwrap());
}

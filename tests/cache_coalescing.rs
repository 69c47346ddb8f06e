//! Single-flight cache behavior under concurrency

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rebuild_lane::cache::{CacheError, CoalescingCache};
use rebuild_lane::http::{fetch_bytes, CachedClient};
use rebuild_lane::mock::MockHttpClient;

const THREADS: usize = 16;

#[test]
fn test_concurrent_misses_compute_once() {
    let cache = Arc::new(CoalescingCache::<u64>::new());
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_insert_with("answer", || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok::<_, std::io::Error>(42)
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 42);
    }
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert!(cache.contains("answer"));
}

#[test]
fn test_shared_failure_is_not_cached() {
    let cache = Arc::new(CoalescingCache::<u64>::new());
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_insert_with("flaky", || {
                    computed.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Err::<u64, _>("upstream unavailable")
                })
            })
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, CacheError::Compute(_)));
        assert!(err.to_string().contains("upstream unavailable"));
    }
    assert!(!cache.contains("flaky"));

    // The next caller starts a fresh computation.
    let before = computed.load(Ordering::SeqCst);
    let value = cache.get_or_insert_with("flaky", || Ok::<_, std::io::Error>(7)).unwrap();
    assert_eq!(value, 7);
    assert_eq!(computed.load(Ordering::SeqCst), before);
    assert!(cache.contains("flaky"));
}

#[test]
fn test_concurrent_http_fetches_share_one_request() {
    let mock = MockHttpClient::new();
    mock.respond("https://files.example/pkg.tgz", 200, b"tarball");
    let client = Arc::new(CachedClient::new(mock.clone(), CoalescingCache::<Vec<u8>>::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let client = Arc::clone(&client);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                fetch_bytes(client.as_ref(), "https://files.example/pkg.tgz").unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"tarball");
    }
    assert_eq!(mock.request_count(), 1);
}

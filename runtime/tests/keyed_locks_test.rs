//! Acquisition behaviour of keyed locks observed from outside the crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gym_runtime::locks::KeyedLocks;
use gym_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready_ok, task};

#[tokio::test]
async fn waiter_is_woken_when_holder_releases() {
    let locks = KeyedLocks::<u32>::new("session");
    let held = locks.acquire(1, Duration::from_secs(1)).await.unwrap();

    let mut waiter = task::spawn(locks.acquire(1, Duration::from_secs(5)));
    assert_pending!(waiter.poll());

    drop(held);
    assert!(waiter.is_woken());
    let guard = assert_ready_ok!(waiter.poll());
    assert_eq!(*guard.key(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_request_orders_do_not_deadlock() {
    let locks = Arc::new(KeyedLocks::<u32>::new("equipment"));
    let mut handles = Vec::new();

    for i in 0..50 {
        let locks = Arc::clone(&locks);
        handles.push(tokio::spawn(async move {
            let keys = if i % 2 == 0 { vec![1, 2, 3] } else { vec![3, 2, 1] };
            let deadline = Instant::now() + Duration::from_secs(5);
            let guards = locks.acquire_all_until(keys, deadline).await?;
            tokio::task::yield_now().await;
            drop(guards);
            Ok::<_, gym_runtime::LockError>(())
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn retry_outlasts_a_short_hold() {
    let locks = Arc::new(KeyedLocks::<u32>::new("user"));
    let held = locks.acquire(4, Duration::from_secs(1)).await.unwrap();

    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);
    });

    let policy = RetryPolicy::builder()
        .max_retries(10)
        .initial_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
        .build();

    let guard = retry_with_predicate(
        &policy,
        || locks.acquire(4, Duration::from_millis(10)),
        |_| true,
    )
    .await
    .expect("lock should be granted once the holder lets go");

    assert_eq!(*guard.key(), 4);
    releaser.await.unwrap();
}

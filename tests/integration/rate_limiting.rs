//! Integration tests for slot-based rate limiting

use chrono::Utc;
use ladder_fetcher::orchestrator::{QuotaGate, RateLimitObservation, RateLimiter, SlotSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Let spawned tasks reach their await points
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_refresh_grants_suspended_waiter() {
    let limiter = RateLimiter::new("test", 0);

    let waiter = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.request_slot().await }
    });
    settle().await;
    assert_eq!(limiter.queued_waiters(), 1);
    assert!(!waiter.is_finished());

    limiter.refresh_slots(1);

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should be granted")
        .unwrap()
        .unwrap();
    assert_eq!(limiter.available_slots(), 0);
    assert_eq!(limiter.queued_waiters(), 0);
}

#[tokio::test]
async fn test_waiters_are_granted_in_arrival_order() {
    let limiter = RateLimiter::new("fifo", 0);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for caller in ["first", "second"] {
        let limiter = limiter.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            limiter.request_slot().await.unwrap();
            order.lock().await.push(caller);
        }));
        // Enqueue strictly one after the other
        settle().await;
    }
    assert_eq!(limiter.queued_waiters(), 2);

    limiter.refresh_slots(1);
    settle().await;
    assert_eq!(*order.lock().await, vec!["first"]);
    assert_eq!(limiter.queued_waiters(), 1);

    limiter.refresh_slots(1);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().await, vec!["first", "second"]);
}

#[tokio::test]
async fn test_observation_refills_at_reset() {
    let limiter = RateLimiter::new("live", 0);
    let observation =
        RateLimitObservation::new(10, 3, Utc::now() + chrono::Duration::milliseconds(500));

    assert!(limiter.update(observation));
    assert!(limiter.is_refill_pending());
    assert_eq!(limiter.available_slots(), 0);

    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(limiter.available_slots(), 10);
    assert!(!limiter.is_refill_pending());
    assert_eq!(limiter.last_observation(), Some(observation));
}

#[tokio::test]
async fn test_observation_refill_wakes_queued_callers_first() {
    let limiter = RateLimiter::new("live", 0);
    let waiter = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.request_slot().await }
    });
    settle().await;

    limiter.update(RateLimitObservation::new(
        5,
        0,
        Utc::now() + chrono::Duration::milliseconds(100),
    ));

    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("refill should grant the waiter")
        .unwrap()
        .unwrap();
    assert_eq!(limiter.available_slots(), 4);
}

#[tokio::test]
async fn test_stale_and_overlapping_observations_are_ignored() {
    let limiter = RateLimiter::new("live", 0);
    let reset = Utc::now() + chrono::Duration::milliseconds(200);

    assert!(limiter.update(RateLimitObservation::new(10, 9, reset)));
    // Newer reset, but a refill is already scheduled
    assert!(!limiter.update(RateLimitObservation::new(
        10,
        8,
        reset + chrono::Duration::seconds(1)
    )));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(limiter.available_slots(), 10);

    // Same reset as the accepted one is stale
    assert!(!limiter.update(RateLimitObservation::new(10, 7, reset)));
    assert!(!limiter.is_refill_pending());
}

#[tokio::test]
async fn test_try_acquire_never_goes_negative() {
    let limiter = RateLimiter::new("strict", 2);
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
    assert_eq!(limiter.available_slots(), 0);
}

#[tokio::test]
async fn test_refresh_replaces_leftover_slots() {
    let limiter = RateLimiter::new("replace", 7);
    limiter.refresh_slots(3);
    assert_eq!(limiter.available_slots(), 3);
}

#[tokio::test]
async fn test_undetermined_slots_use_fallback_without_feedback() {
    let limiter = RateLimiter::new("per_hour", 0);
    assert!(limiter.refresh_undetermined_slots(Duration::from_secs(60), 100));
    assert_eq!(limiter.available_slots(), 100);
}

#[tokio::test]
async fn test_undetermined_refill_skips_fresh_feedback() {
    let limiter = RateLimiter::new("per_hour", 0);
    limiter.update(RateLimitObservation::new(
        50,
        49,
        Utc::now() + chrono::Duration::milliseconds(50),
    ));
    // Pending observation refill blocks the watchdog
    assert!(!limiter.refresh_undetermined_slots(Duration::from_secs(60), 100));

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Reset is recent, so the feedback is still considered live
    assert!(!limiter.refresh_undetermined_slots(Duration::from_secs(60), 100));
    assert_eq!(limiter.available_slots(), 50);
}

#[tokio::test]
async fn test_periodic_refill_stops_when_dropped() {
    let limiter = RateLimiter::new("per_second", 0);
    let refill = limiter.spawn_periodic_refill(5, Duration::from_millis(50));
    settle().await;
    assert_eq!(limiter.available_slots(), 5);

    for _ in 0..5 {
        assert!(limiter.try_acquire());
    }
    refill.stop();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(limiter.available_slots(), 0);
}

#[tokio::test]
async fn test_quota_gate_takes_a_slot_from_every_limiter() {
    let per_second = RateLimiter::new("per_second", 3);
    let per_hour = RateLimiter::new("per_hour", 10);
    let gate = QuotaGate::new(vec![per_second.clone(), per_hour.clone()]);

    gate.request_slot().await.unwrap();
    gate.request_slot().await.unwrap();

    assert_eq!(per_second.available_slots(), 1);
    assert_eq!(per_hour.available_slots(), 8);
    assert!(gate.live_limiter().is_none());
}

#[tokio::test]
async fn test_abandoned_request_leaves_the_queue() {
    let limiter = RateLimiter::new("abandon", 0);
    let result = tokio::time::timeout(Duration::from_millis(50), limiter.request_slot()).await;
    assert!(result.is_err());
    assert_eq!(limiter.queued_waiters(), 0);

    limiter.refresh_slots(1);
    assert_eq!(limiter.available_slots(), 1);
}

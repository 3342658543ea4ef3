//! Integration tests for the bounded-concurrency batch fetcher

use futures_util::StreamExt;
use ladder_fetcher::fetcher::FetchError;
use ladder_fetcher::orchestrator::{BatchFetcher, RateLimiter, RetryPolicy};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fetcher(limiter: &RateLimiter, width: usize) -> BatchFetcher {
    BatchFetcher::new(
        Arc::new(limiter.clone()),
        RetryPolicy::new(3),
        width,
        Duration::ZERO,
    )
    .with_shutdown(None)
}

#[tokio::test]
async fn test_persistent_transient_failures_are_dropped() {
    let limiter = RateLimiter::new("batch", 10_000);
    let calls = Arc::new(AtomicUsize::new(0));

    let results: Vec<_> = fetcher(&limiter, 22)
        .fetch_many((0..1000u32).collect(), {
            let calls = calls.clone();
            move |id| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if id % 100 == 0 {
                        Err(FetchError::ServerError {
                            status: 500,
                            message: "boom".to_string(),
                        })
                    } else {
                        Ok(id * 2)
                    }
                }
            }
        })
        .collect()
        .await;

    assert_eq!(results.len(), 990);
    let ids: HashSet<u32> = results.iter().map(|r| r.descriptor).collect();
    assert_eq!(ids.len(), 990);
    assert!(ids.iter().all(|id| id % 100 != 0));
    assert!(results.iter().all(|r| r.payload == r.descriptor * 2));

    // 990 single attempts plus 10 descriptors exhausting 3 attempts each
    assert_eq!(calls.load(Ordering::SeqCst), 1020);
    assert_eq!(limiter.available_slots(), 10_000 - 1020);
}

#[tokio::test]
async fn test_lanes_never_exceed_width() {
    let limiter = RateLimiter::new("batch", 1000);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let count = fetcher(&limiter, 4)
        .fetch_many((0..40u32).collect(), {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move |id| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, FetchError>(id)
                }
            }
        })
        .count()
        .await;

    assert_eq!(count, 40);
    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_placeholder_mode_keeps_one_item_per_input() {
    let limiter = RateLimiter::new("batch", 100);

    let results: Vec<_> = fetcher(&limiter, 3)
        .fetch_many_or_else(
            (1..=10i64).collect(),
            |id| async move {
                if id % 3 == 0 {
                    Err(FetchError::NotFound(format!("/matches/{id}")))
                } else {
                    Ok(vec![id])
                }
            },
            Vec::new(),
        )
        .collect()
        .await;

    assert_eq!(results.len(), 10);
    let mut empty: Vec<i64> = results
        .iter()
        .filter(|r| r.payload.is_empty())
        .map(|r| r.descriptor)
        .collect();
    empty.sort_unstable();
    assert_eq!(empty, vec![3, 6, 9]);
}

#[tokio::test]
async fn test_starved_batch_waits_for_refills() {
    let limiter = RateLimiter::new("batch", 0);
    let _refill = limiter.spawn_periodic_refill(5, Duration::from_millis(50));

    let results: Vec<_> = tokio::time::timeout(
        Duration::from_secs(2),
        fetcher(&limiter, 5)
            .fetch_many((0..12u32).collect(), |id| async move {
                Ok::<_, FetchError>(id)
            })
            .collect::<Vec<_>>(),
    )
    .await
    .expect("batch should finish as refills arrive");

    assert_eq!(results.len(), 12);
}

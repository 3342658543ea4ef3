//! Production observability metrics for the ladder fetcher
//!
//! This module records slot pool health, upstream rate limit feedback,
//! retries, HTTP calls and per-fetch outcomes.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (e.g. :9090/metrics)
//! - Recording is a no-op until [`init_metrics`] installs a recorder

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Waits longer than this are logged at debug level
const SLOW_GRANT_THRESHOLD: Duration = Duration::from_millis(500);

/// Initialize metrics system with Prometheus exporter
///
/// This should be called once at application startup, typically in main().
/// The function is idempotent and will not reinitialize if already called.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
///
/// # Returns
/// Ok(()) if metrics initialized successfully, Err if binding fails
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the ladder API"
    );

    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit errors received"
    );

    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Total number of retries after transient failures"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff before a retry, excluding the wait for a fresh slot"
    );

    describe_counter!(
        "slots_granted_total",
        Unit::Count,
        "Total number of rate limit slots granted"
    );

    describe_histogram!(
        "slot_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit slot"
    );

    describe_counter!(
        "slots_refreshed_total",
        Unit::Count,
        "Total number of slots made available by refills"
    );

    describe_gauge!(
        "slots_available",
        Unit::Count,
        "Slots currently available in a limiter"
    );

    describe_gauge!(
        "slot_waiters",
        Unit::Count,
        "Callers currently queued on a limiter"
    );

    describe_counter!(
        "rate_limit_observations_total",
        Unit::Count,
        "Upstream rate limit observations by outcome"
    );

    describe_counter!(
        "fetches_completed_total",
        Unit::Count,
        "Total number of fetches that succeeded"
    );

    describe_counter!(
        "fetches_failed_total",
        Unit::Count,
        "Total number of fetches that failed after retries"
    );

    describe_counter!(
        "discovery_runs_total",
        Unit::Count,
        "Discovery runs by kind and result"
    );

    describe_histogram!(
        "discovery_probes",
        Unit::Count,
        "Probes issued per discovery run"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one HTTP call; `status` is `None` for transport failures
pub fn record_http_request(endpoint: &'static str, status: Option<u16>, duration: Duration) {
    let status_label = status.map_or_else(|| "network_error".to_string(), |s| s.to_string());

    counter!(
        "http_requests_total",
        "endpoint" => endpoint,
        "status" => status_label,
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "endpoint" => endpoint,
    )
    .record(duration.as_secs_f64());

    if status == Some(429) {
        counter!("http_429_errors_total", "endpoint" => endpoint).increment(1);
    }
}

/// Record a retry after a transient failure
pub fn record_retry(error_kind: &'static str, attempt: u32, backoff: Duration) {
    counter!(
        "fetch_retries_total",
        "error" => error_kind,
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(backoff.as_secs_f64());

    debug!(
        error = error_kind,
        attempt,
        backoff_ms = backoff.as_millis() as u64,
        "Retry recorded"
    );
}

/// Record a slot grant and how long the caller waited for it
pub fn record_slot_granted(limiter: &str, waited: Duration, queued: bool) {
    counter!(
        "slots_granted_total",
        "limiter" => limiter.to_string(),
        "queued" => if queued { "true" } else { "false" },
    )
    .increment(1);

    histogram!("slot_wait_seconds", "limiter" => limiter.to_string())
        .record(waited.as_secs_f64());

    if waited > SLOW_GRANT_THRESHOLD {
        debug!(
            limiter,
            wait_ms = waited.as_millis() as u64,
            "Slot granted after wait"
        );
    }
}

/// Record a refill
pub fn record_slots_refreshed(limiter: &str, source: &'static str, slots: u64, granted: u64) {
    counter!(
        "slots_refreshed_total",
        "limiter" => limiter.to_string(),
        "source" => source,
    )
    .increment(slots);

    if granted > 0 {
        debug!(limiter, source, slots, granted, "Refill woke queued callers");
    }
}

/// Update the pool gauges of one limiter
pub fn update_slot_gauges(limiter: &str, available: u64, queued: usize) {
    gauge!("slots_available", "limiter" => limiter.to_string()).set(available as f64);
    gauge!("slot_waiters", "limiter" => limiter.to_string()).set(queued as f64);
}

/// Record what happened to an upstream rate limit observation
pub fn record_observation(limiter: &str, outcome: &'static str) {
    counter!(
        "rate_limit_observations_total",
        "limiter" => limiter.to_string(),
        "outcome" => outcome,
    )
    .increment(1);

    if outcome == "stale" {
        debug!(limiter, "Stale rate limit observation ignored");
    }
}

/// Record a fetch that succeeded
pub fn record_fetch_completed() {
    counter!("fetches_completed_total").increment(1);
}

/// Record a fetch that failed after its retries
pub fn record_fetch_failed(error_kind: &'static str) {
    counter!("fetches_failed_total", "error" => error_kind).increment(1);
}

/// Record a discovery run
pub fn record_discovery(kind: &'static str, probes: u32, found: bool) {
    counter!(
        "discovery_runs_total",
        "kind" => kind,
        "found" => if found { "true" } else { "false" },
    )
    .increment(1);

    histogram!("discovery_probes", "kind" => kind).record(f64::from(probes));

    if !found {
        warn!(kind, probes, "Discovery finished without a result");
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

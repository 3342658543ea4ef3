//! Shared resources for all ladder API clients
//!
//! This module provides the process-wide HTTP client and quota gate so that
//! every client and orchestrator in the process draws from one pool of slots.
//!
//! # Critical for Production
//!
//! The upstream enforces its caps per API key. Two orchestrators with their
//! own limiters would each believe they own the full quota and together
//! exceed it.

use once_cell::sync::{Lazy, OnceCell};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::rate_limit::{QuotaGate, RateLimiter};

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Global HTTP client shared by all API clients
///
/// Configured with explicit timeouts to prevent indefinite hangs:
/// - Connect timeout: 10 seconds
/// - Request timeout: 30 seconds
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {}. Check system TLS configuration.", e);
            }),
    )
});

static GLOBAL_QUOTA_GATE: OnceCell<Arc<QuotaGate>> = OnceCell::new();

/// Get the global HTTP client
///
/// Returns a clone of the Arc, which is cheap (just increments ref count)
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// Get the global quota gate, building it from `config` on first use.
///
/// Later calls return the same gate whatever config they pass. Refill timers
/// run on the runtime of the latest slot request, so the gate keeps working
/// after the runtime that built it shuts down.
pub fn global_quota_gate(config: &OrchestratorConfig) -> Arc<QuotaGate> {
    GLOBAL_QUOTA_GATE
        .get_or_init(|| Arc::new(QuotaGate::from_config(config)))
        .clone()
}

/// Limiter of the global gate that learns from response headers
pub fn global_live_limiter(config: &OrchestratorConfig) -> Option<RateLimiter> {
    global_quota_gate(config).live_limiter().cloned()
}

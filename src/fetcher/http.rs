//! Ladder API HTTP client
//!
//! Makes exactly one GET per call. Slots and retries belong to the
//! orchestrator; this layer only maps responses onto [`FetchError`] and feeds
//! the `X-RateLimit-*` headers of every response to the live limiter.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::api_config::Endpoint;
use super::classify::extract_failure_kind;
use super::{FetchError, FetcherResult};
use crate::metrics;
use crate::orchestrator::rate_limit::{RateLimitObservation, RateLimiter};

/// Slots per window header
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Slots left header
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Window reset header, epoch seconds
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 256;

/// HTTP client for one ladder API host
#[derive(Debug, Clone)]
pub struct LadderHttpClient {
    client: Arc<Client>,
    base_url: String,
    live_limiter: Option<RateLimiter>,
    access_token: Option<String>,
}

impl LadderHttpClient {
    /// Create new HTTP client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `base_url` - Host URL without trailing slash (e.g. "<https://eu.api.blizzard.com>")
    /// * `live_limiter` - Limiter receiving rate limit observations, if any
    pub fn new(
        client: Arc<Client>,
        base_url: impl Into<String>,
        live_limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            live_limiter,
            access_token: None,
        }
    }

    /// Send `token` as a bearer token with every request
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    /// Host this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `endpoint` once and decode the JSON body.
    ///
    /// # Errors
    /// - 404 → [`FetchError::NotFound`]
    /// - 429 → [`FetchError::RateLimitExceeded`]
    /// - 5xx → [`FetchError::ServerError`], other 4xx → [`FetchError::ClientError`]
    /// - transport failures → [`FetchError::Timeout`] / [`FetchError::NetworkError`]
    /// - undecodable body → [`FetchError::ParseError`]
    pub async fn get<T>(&self, endpoint: Endpoint) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let path = endpoint.path();
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        debug!(endpoint = endpoint.label(), %url, "GET");
        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_http_request(endpoint.label(), None, started.elapsed());
                let kind = extract_failure_kind(e.status(), Some(&e));
                return Err(kind.into_error(&path, e.to_string()));
            }
        };

        let status = response.status();
        self.observe_rate_limit(response.headers());
        metrics::record_http_request(endpoint.label(), Some(status.as_u16()), started.elapsed());

        if !status.is_success() {
            let kind = extract_failure_kind(Some(status), None);
            if status.as_u16() == 429 {
                warn!(endpoint = endpoint.label(), %path, "Upstream rejected call with 429");
            }
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.to_string()
            } else {
                truncate(&body, MAX_ERROR_BODY)
            };
            return Err(kind.into_error(&path, message));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| extract_failure_kind(None, Some(&e)).into_error(&path, e.to_string()))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::ParseError(format!("{path}: {e}")))
    }

    fn observe_rate_limit(&self, headers: &HeaderMap) {
        let Some(limiter) = &self.live_limiter else {
            return;
        };
        if let Some(observation) = parse_rate_limit_headers(headers) {
            limiter.update(observation);
        }
    }
}

/// Parse `X-RateLimit-{Limit,Remaining,Reset}` into an observation.
///
/// Returns `None` unless all three headers are present and valid.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitObservation> {
    let limit = header_u64(headers, HEADER_LIMIT)?;
    let remaining = header_u64(headers, HEADER_REMAINING)?;
    let reset_secs = header_u64(headers, HEADER_RESET)?;
    let reset = DateTime::<Utc>::from_timestamp(i64::try_from(reset_secs).ok()?, 0)?;
    Some(RateLimitObservation::new(limit, remaining, reset))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    let raw = headers.get(name)?.to_str().ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {} header '{}': {}", name, raw, e);
            None
        }
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}

//! Failure classification and retry message formatting.
//!
//! Maps raw HTTP outcomes (status codes, transport errors) onto
//! [`FetchError`] variants and renders consistent, greppable log lines for
//! retries and final failures.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

use super::FetchError;

/// Classification of a failed call for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network timeout or stalled connection
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 404
    NotFound,
    /// Other client errors (4xx, except 404 and 429)
    ClientError(u16),
    /// Payload could not be decoded
    Malformed,
    /// Domain-level miss (membership, game mode, exhausted candidates)
    Domain,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl FailureKind {
    /// Short description used inside log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::NotFound => "resource not found",
            Self::ClientError(code) => match code {
                401 | 403 => "authentication failed",
                _ => "client error",
            },
            Self::Malformed => "malformed response",
            Self::Domain => "no matching ladder data",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown with final failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check network latency or raise the request timeout",
            Self::NetworkOffline => "Verify connectivity and DNS resolution for the API host",
            Self::RateLimit => "Lower --requests-per-second or the safety coefficient",
            Self::ServerError(_) => "Upstream may be degraded, try again later",
            Self::NotFound => "Check region, season and ids",
            Self::ClientError(_) => "Review request parameters and credentials",
            Self::Malformed => "Upstream payload changed shape, check the API changelog",
            Self::Domain => "Refresh the candidate list for this ladder",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Kind of an already-built error.
    pub fn of(error: &FetchError) -> Self {
        match error {
            FetchError::NotFound(_) => Self::NotFound,
            FetchError::RateLimitExceeded => Self::RateLimit,
            FetchError::ServerError { status, .. } => Self::ServerError(*status),
            FetchError::ClientError { status, .. } => Self::ClientError(*status),
            FetchError::NetworkError(_) => Self::NetworkOffline,
            FetchError::Timeout(_) => Self::NetworkTimeout,
            FetchError::ParseError(_) => Self::Malformed,
            FetchError::GameModeMismatch { .. }
            | FetchError::MembershipAbsent { .. }
            | FetchError::CandidatesExhausted { .. } => Self::Domain,
            FetchError::RateLimiter(_) | FetchError::Cancelled => Self::NetworkGeneric,
        }
    }

    /// Build the matching [`FetchError`].
    pub fn into_error(self, endpoint: &str, message: impl Into<String>) -> FetchError {
        let message = message.into();
        match self {
            Self::NetworkTimeout => FetchError::Timeout(format!("{endpoint}: {message}")),
            Self::NetworkOffline | Self::NetworkGeneric => {
                FetchError::NetworkError(format!("{endpoint}: {message}"))
            }
            Self::RateLimit => FetchError::RateLimitExceeded,
            Self::ServerError(status) => FetchError::ServerError { status, message },
            Self::NotFound => FetchError::NotFound(endpoint.to_string()),
            Self::ClientError(status) => FetchError::ClientError { status, message },
            Self::Malformed | Self::Domain => {
                FetchError::ParseError(format!("{endpoint}: {message}"))
            }
        }
    }
}

/// Extract a [`FailureKind`] from an HTTP status or reqwest error.
pub fn extract_failure_kind(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> FailureKind {
    if let Some(status) = status {
        match status.as_u16() {
            404 => return FailureKind::NotFound,
            429 => return FailureKind::RateLimit,
            _ => {}
        }

        if status.is_server_error() {
            return FailureKind::ServerError(status.as_u16());
        }

        if status.is_client_error() {
            return FailureKind::ClientError(status.as_u16());
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return FailureKind::NetworkTimeout;
        }

        if err.is_connect() {
            return FailureKind::NetworkOffline;
        }

        if err.is_decode() {
            return FailureKind::Malformed;
        }
    }

    FailureKind::NetworkGeneric
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt about to run, or the one that just finished (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Kind of failure that triggered the retry
    pub kind: FailureKind,
    /// Backoff before the next attempt, on top of waiting for a slot
    pub backoff: Duration,
    /// What was being fetched (e.g. "season EU/57")
    pub target: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used by the retry decorator.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        kind: FailureKind,
        backoff: Duration,
        target: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            kind,
            backoff,
            target: target.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying {} (attempt {}/{}) after {}",
            self.target,
            self.attempt,
            self.max_attempts,
            self.kind.description()
        );
        if !self.backoff.is_zero() {
            message.push_str(&format!(
                " - backing off {:.1}s",
                self.backoff.as_secs_f64()
            ));
        }
        message.push_str(" - waiting for a fresh slot");
        message
    }

    /// Format retry success message.
    pub fn format_success(&self) -> String {
        format!(
            "{} succeeded on attempt {}/{} after {}",
            self.target,
            self.attempt,
            self.max_attempts,
            self.kind.description()
        )
    }

    /// Format final failure summary with a suggestion.
    pub fn format_failure(&self) -> String {
        [
            format!(
                "[FAILED] {} failed after {} attempt(s)",
                self.target, self.attempt
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Suggestion: {}", self.kind.suggestion()),
        ]
        .join("\n")
    }
}

//! Upstream ladder API boundary
//!
//! Everything the orchestrator knows about the remote API lives here: the
//! [`LadderApi`] trait it calls through, the [`FetchError`] type every call
//! returns, and the single [`FetchError::class`] decision that separates
//! transient failures (retry) from terminal ones (give up on this item).

use crate::orchestrator::rate_limit::RateLimitError;
use crate::{LadderSummary, PlayerCharacter, Region, Season};
use async_trait::async_trait;

pub mod api_config;
pub mod classify;
pub mod http;
pub mod ladder_api;
pub mod shared_resources;

/// Why an error is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// Upstream reported the resource does not exist (404)
    NotFound,
    /// Candidate is a member of the ladder but in an unexpected game mode
    GameModeMismatch,
    /// Candidate exists but is no longer a member of the ladder
    MembershipAbsent,
    /// Every candidate was tried without a match
    CandidatesExhausted,
    /// Non-retryable client error (4xx other than 404/429)
    ClientError(u16),
    /// Payload could not be decoded
    Malformed,
    /// Operation abandoned by shutdown or a closed rate limiter
    Cancelled,
}

/// Error classification consulted once at the retry boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt with a fresh slot
    Transient,
    /// Never retried
    Terminal(TerminalReason),
}

impl ErrorClass {
    /// Whether the error may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Resource not found (404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream rejected the call with 429
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// 5xx response
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Non-retryable 4xx response
    #[error("client error {status}: {message}")]
    ClientError {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Connection-level failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Ladder membership found with an unexpected game mode
    #[error("invalid game mode for ladder {ladder_id}: {found}")]
    GameModeMismatch {
        /// Ladder id that was looked up
        ladder_id: i64,
        /// Localized mode label reported by the upstream
        found: String,
    },

    /// Candidate no longer belongs to the ladder
    #[error("{character} is not a member of ladder {ladder_id}")]
    MembershipAbsent {
        /// Candidate that was probed
        character: PlayerCharacter,
        /// Ladder id that was looked up
        ladder_id: i64,
    },

    /// No candidate resolved the ladder
    #[error("ladder {ladder_id} not found after {candidates} candidate(s)")]
    CandidatesExhausted {
        /// Ladder id that was looked up
        ladder_id: i64,
        /// Number of candidates tried
        candidates: usize,
    },

    /// Slot request failed
    #[error("rate limiter error: {0}")]
    RateLimiter(#[from] RateLimitError),

    /// Shutdown requested before the call was made
    #[error("cancelled: shutdown requested")]
    Cancelled,
}

impl FetchError {
    /// Classify this error for the retry decorator
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::RateLimitExceeded
            | FetchError::ServerError { .. }
            | FetchError::NetworkError(_)
            | FetchError::Timeout(_) => ErrorClass::Transient,
            FetchError::NotFound(_) => ErrorClass::Terminal(TerminalReason::NotFound),
            FetchError::ClientError { status, .. } => {
                ErrorClass::Terminal(TerminalReason::ClientError(*status))
            }
            FetchError::ParseError(_) => ErrorClass::Terminal(TerminalReason::Malformed),
            FetchError::GameModeMismatch { .. } => {
                ErrorClass::Terminal(TerminalReason::GameModeMismatch)
            }
            FetchError::MembershipAbsent { .. } => {
                ErrorClass::Terminal(TerminalReason::MembershipAbsent)
            }
            FetchError::CandidatesExhausted { .. } => {
                ErrorClass::Terminal(TerminalReason::CandidatesExhausted)
            }
            FetchError::RateLimiter(_) | FetchError::Cancelled => {
                ErrorClass::Terminal(TerminalReason::Cancelled)
            }
        }
    }

    /// Shorthand for `self.class().is_transient()`
    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }

    /// Whether the upstream reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotFound(_) => "not_found",
            FetchError::RateLimitExceeded => "rate_limited",
            FetchError::ServerError { .. } => "server_error",
            FetchError::ClientError { .. } => "client_error",
            FetchError::NetworkError(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::ParseError(_) => "parse",
            FetchError::GameModeMismatch { .. } => "game_mode_mismatch",
            FetchError::MembershipAbsent { .. } => "membership_absent",
            FetchError::CandidatesExhausted { .. } => "candidates_exhausted",
            FetchError::RateLimiter(_) => "rate_limiter",
            FetchError::Cancelled => "cancelled",
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetchError>;

/// The upstream calls the orchestrator composes.
///
/// Implementations make exactly one attempt per call and never wait for rate
/// limit slots themselves; slots and retries are the orchestrator's job.
#[async_trait]
pub trait LadderApi: Send + Sync {
    /// Dedicated "current season" probe for a region
    async fn current_season(&self, region: Region) -> FetcherResult<Season>;

    /// Fetch one season by number; 404 means the season does not exist yet
    async fn season(&self, region: Region, season_id: i32) -> FetcherResult<Season>;

    /// Fetch the ladder summary (all memberships) of one character
    async fn ladder_summary(
        &self,
        region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<LadderSummary>;

    /// Fetch a ladder payload by id
    async fn ladder(&self, region: Region, ladder_id: i64) -> FetcherResult<serde_json::Value>;

    /// Fetch recent matches of one character; an empty list is a valid outcome
    async fn match_history(
        &self,
        region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<Vec<serde_json::Value>>;
}

//! Fetch orchestration and rate limiting
//!
//! This module gates outbound calls against a shared quota and composes them
//! into batches and discovery probes.
//!
//! # Overview
//!
//! 1. **Slots**: Every attempt takes one slot from a [`rate_limit::SlotSource`]
//!    ([`rate_limit::RateLimiter`], or a [`rate_limit::QuotaGate`] over several)
//! 2. **Retries**: [`retry::retry_with_slot`] retries transient failures with a
//!    fresh slot and gives up on terminal ones immediately
//! 3. **Batches**: [`batch::BatchFetcher`] runs descriptors through bounded
//!    parallel lanes
//! 4. **Discovery**: [`discovery`] finds the latest season and resolves ladder
//!    membership by sequential probing
//! 5. **Facade**: [`executor::Orchestrator`] wires the above to a
//!    [`LadderApi`](crate::fetcher::LadderApi)
//!
//! # Quick Start
//!
//! ```no_run
//! use ladder_fetcher::orchestrator::{RateLimiter, RetryPolicy, retry_with_slot};
//! use ladder_fetcher::FetchError;
//!
//! # async fn example() -> Result<(), FetchError> {
//! let limiter = RateLimiter::new("per_second", 90);
//! let _refill = limiter.spawn_periodic_refill(90, std::time::Duration::from_secs(1));
//!
//! limiter.request_slot().await?;
//! let value = retry_with_slot(&limiter, RetryPolicy::new(3), "example", || async {
//!     Ok::<_, FetchError>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod rate_limit;
pub mod retry;

pub use batch::{BatchFetcher, FailedFetch, FetchOutcome, FetchStream, Fetched};
pub use config::OrchestratorConfig;
pub use discovery::{DiscoveredMembership, SeasonProbeLimits};
pub use executor::Orchestrator;
pub use rate_limit::{
    PeriodicRefill, QuotaGate, RateLimitError, RateLimitObservation, RateLimiter, SlotSource,
};
pub use retry::{fetch_with_slot, retry_with_slot, RetryPolicy};

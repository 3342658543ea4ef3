//! Orchestrator facade over a [`LadderApi`]
//!
//! Every call made through the [`Orchestrator`] takes a slot from the shared
//! [`SlotSource`] first and is retried with a fresh slot on transient failure.
//! Discovery probes go through the same path, so they queue FIFO with batch
//! lanes and never bypass the quota.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::fetcher::shared_resources;
use crate::fetcher::{FetcherResult, LadderApi};
use crate::orchestrator::batch::{BatchFetcher, FetchOutcome, FetchStream, Fetched};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::discovery::{
    discover_current_or_last, discover_membership, discover_season_chain, DiscoveredMembership,
    SeasonProbeLimits,
};
use crate::orchestrator::rate_limit::SlotSource;
use crate::orchestrator::retry::{fetch_with_slot, RetryPolicy};
use crate::shutdown::{self, SharedShutdown};
use crate::{GameMode, LadderSummary, PlayerCharacter, Region, Season};

/// Rate-limited, retrying front end for one upstream API
pub struct Orchestrator<A: LadderApi> {
    api: Arc<A>,
    slots: Arc<dyn SlotSource>,
    config: OrchestratorConfig,
    shutdown: Option<SharedShutdown>,
}

impl<A: LadderApi> Clone for Orchestrator<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            slots: self.slots.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<A: LadderApi + 'static> Orchestrator<A> {
    /// Orchestrator sharing the process-wide quota gate.
    ///
    /// The global gate is built from `config` on first use; later calls reuse
    /// it regardless of their config. Must be called from within a Tokio
    /// runtime.
    pub fn new(api: Arc<A>, config: OrchestratorConfig) -> Self {
        let slots: Arc<dyn SlotSource> = shared_resources::global_quota_gate(&config);
        Self::with_slots(api, slots, config)
    }

    /// Orchestrator over an explicit slot source
    pub fn with_slots(api: Arc<A>, slots: Arc<dyn SlotSource>, config: OrchestratorConfig) -> Self {
        Self {
            api,
            slots,
            config,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Use a specific shutdown coordinator instead of the global one
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Underlying API client
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Shared slot source
    pub fn slots(&self) -> &Arc<dyn SlotSource> {
        &self.slots
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    /// Batch fetcher sized from the configuration
    pub fn batch(&self) -> BatchFetcher {
        BatchFetcher::new(
            self.slots.clone(),
            self.policy(),
            self.config.concurrency_width(),
            self.config.dispatch_delay,
        )
        .with_shutdown(self.shutdown.clone())
    }

    /// Run one call under the slot and retry discipline.
    ///
    /// # Arguments
    /// * `target` - Label used in retry logs (e.g. "season EU/57")
    /// * `op` - Makes one attempt against the API
    pub async fn fetch_one<T, F, Fut>(&self, target: &str, op: F) -> FetcherResult<T>
    where
        F: Fn(Arc<A>) -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        fetch_with_slot(&*self.slots, self.policy(), target, || op(self.api.clone())).await
    }

    /// Fetch many descriptors, yielding successes only
    pub fn fetch_many<D, T, F, Fut>(&self, descriptors: Vec<D>, op: F) -> FetchStream<Fetched<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(Arc<A>, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        let api = self.api.clone();
        self.batch()
            .fetch_many(descriptors, move |d| op(api.clone(), d))
    }

    /// Fetch many descriptors, substituting `placeholder` for failures.
    /// Descriptors skipped after a shutdown request are dropped.
    pub fn fetch_many_or_else<D, T, F, Fut>(
        &self,
        descriptors: Vec<D>,
        op: F,
        placeholder: T,
    ) -> FetchStream<Fetched<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(Arc<A>, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        let api = self.api.clone();
        self.batch()
            .fetch_many_or_else(descriptors, move |d| op(api.clone(), d), placeholder)
    }

    /// Fetch many descriptors, yielding every outcome
    pub fn fetch_many_results<D, T, F, Fut>(
        &self,
        descriptors: Vec<D>,
        op: F,
    ) -> FetchStream<FetchOutcome<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(Arc<A>, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        let api = self.api.clone();
        self.batch()
            .fetch_many_results(descriptors, move |d| op(api.clone(), d))
    }

    /// Dedicated current-season probe through the slot and retry discipline
    pub async fn current_season(&self, region: Region) -> FetcherResult<Season> {
        let target = format!("current season {region}");
        self.fetch_one(&target, |api| async move { api.current_season(region).await })
            .await
    }

    /// Fetch one season through the slot and retry discipline
    pub async fn season(&self, region: Region, season_id: i32) -> FetcherResult<Season> {
        let target = format!("season {region}/{season_id}");
        self.fetch_one(&target, |api| async move {
            api.season(region, season_id).await
        })
        .await
    }

    /// Fetch one character's ladder summary through the slot and retry
    /// discipline
    pub async fn ladder_summary(
        &self,
        region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<LadderSummary> {
        let target = format!("ladder summary {region}/{character}");
        self.fetch_one(&target, |api| async move {
            api.ladder_summary(region, character).await
        })
        .await
    }

    /// Newest season reachable from `start`, or `None`
    pub async fn discover_latest_season(&self, region: Region, start: i32) -> Option<Season> {
        discover_season_chain(start, SeasonProbeLimits::from_config(&self.config), |id| {
            self.season(region, id)
        })
        .await
    }

    /// Current season from the dedicated probe, falling back to the season
    /// chain seeded at the configured known recent season
    pub async fn discover_current_or_last_season(&self, region: Region) -> Option<Season> {
        discover_current_or_last(
            self.current_season(region),
            self.config.known_recent_season,
            SeasonProbeLimits::from_config(&self.config),
            |id| self.season(region, id),
        )
        .await
    }

    /// Resolve which candidate belongs to `ladder_id`.
    ///
    /// Each candidate's ladder summary is fetched under the slot and retry
    /// discipline. The overall result is never retried.
    pub async fn discover_ladder_membership(
        &self,
        region: Region,
        candidates: &[PlayerCharacter],
        ladder_id: i64,
        expected_modes: &[GameMode],
    ) -> FetcherResult<DiscoveredMembership> {
        discover_membership(candidates, ladder_id, expected_modes, |character| {
            self.ladder_summary(region, character)
        })
        .await
    }
}

impl<A: LadderApi> fmt::Debug for Orchestrator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

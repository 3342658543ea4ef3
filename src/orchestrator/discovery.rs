//! Discovery by sequential probing
//!
//! - Season chain: walk forward from a starting season until a probe fails and
//!   keep the last success; if the starting season itself fails, walk backward
//!   until one succeeds.
//! - Ladder membership: try candidate characters in order until one is a
//!   member of the target ladder in an expected game mode.
//!
//! Both are plain loops over a probe closure. The closure is expected to be
//! rate limited and retried already; a probe error here is final for that
//! season or candidate.

use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::fetcher::{FetchError, FetcherResult};
use crate::metrics;
use crate::orchestrator::config::OrchestratorConfig;
use crate::{GameMode, LadderMembership, LadderSummary, PlayerCharacter, Season};

/// Bounds for season chain discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonProbeLimits {
    /// Probes after the starting season in the forward phase
    pub max_forward: u32,
    /// Probes below the starting season in the backward phase
    pub max_backward: u32,
    /// Lowest season ever probed
    pub min_season: i32,
}

impl SeasonProbeLimits {
    /// Limits from orchestrator configuration
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_forward: config.max_forward_season_probes,
            max_backward: config.max_backward_season_probes,
            min_season: config.min_season,
        }
    }
}

impl Default for SeasonProbeLimits {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Find the newest season reachable from `start`.
///
/// # Arguments
/// * `start` - First season to probe
/// * `limits` - Forward cap, backward cap and season floor
/// * `probe` - Fetches one season by number
///
/// # Returns
/// The last season that answered in the forward phase, the first one that
/// answered in the backward phase, or `None` when nothing answered.
pub async fn discover_season_chain<F, Fut>(
    start: i32,
    limits: SeasonProbeLimits,
    mut probe: F,
) -> Option<Season>
where
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = FetcherResult<Season>>,
{
    let mut probes = 1;
    let found = match probe(start).await {
        Ok(first) => {
            let mut latest = first;
            let mut capped = true;
            for offset in 1..=limits.max_forward {
                let candidate = start.saturating_add(offset as i32);
                probes += 1;
                match probe(candidate).await {
                    Ok(season) => latest = season,
                    Err(e) => {
                        log_chain_end(candidate, &e);
                        capped = false;
                        break;
                    }
                }
            }
            if capped && limits.max_forward > 0 {
                warn!(
                    start,
                    max_forward = limits.max_forward,
                    latest = latest.id,
                    "Forward season probing hit its cap, upstream never reported an end"
                );
            }
            Some(latest)
        }
        Err(e) => {
            debug!(start, error = %e, "Starting season unavailable, probing backward");
            let mut found = None;
            for offset in 1..=limits.max_backward {
                let candidate = start.saturating_sub(offset as i32);
                if candidate < limits.min_season {
                    break;
                }
                probes += 1;
                match probe(candidate).await {
                    Ok(season) => {
                        found = Some(season);
                        break;
                    }
                    Err(e) => debug!(season = candidate, error = %e, "Season unavailable"),
                }
            }
            found
        }
    };

    metrics::record_discovery("season_chain", probes, found.is_some());
    match &found {
        Some(season) => info!(start, season = season.id, probes, "Discovered latest season"),
        None => warn!(start, probes, "No season found"),
    }
    found
}

fn log_chain_end(season: i32, error: &FetchError) {
    if error.is_not_found() {
        debug!(season, "Season not created yet, chain ends");
    } else {
        warn!(season, error = %error, "Season probe failed, treating as end of chain");
    }
}

/// Dedicated current-season probe with a chain fallback.
///
/// Any error from `current`, outages included, falls back to
/// [`discover_season_chain`] seeded at `seed`.
pub async fn discover_current_or_last<C, F, Fut>(
    current: C,
    seed: i32,
    limits: SeasonProbeLimits,
    probe: F,
) -> Option<Season>
where
    C: Future<Output = FetcherResult<Season>>,
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = FetcherResult<Season>>,
{
    match current.await {
        Ok(season) => {
            debug!(season = season.id, "Current season probe answered");
            Some(season)
        }
        Err(e) => {
            warn!(error = %e, seed, "Current season probe failed, falling back to season chain");
            discover_season_chain(seed, limits, probe).await
        }
    }
}

/// Candidate that resolved a ladder, with its membership entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredMembership {
    /// Character whose summary listed the ladder
    pub character: PlayerCharacter,
    /// Membership entry for the target ladder
    pub membership: LadderMembership,
}

/// Resolve which candidate is a member of `ladder_id`.
///
/// Candidates are tried in order, one probe each. A missing candidate, a
/// candidate no longer in the ladder, or one in the wrong game mode moves on
/// to the next. An empty `expected_modes` accepts any mode.
///
/// # Errors
/// [`FetchError::CandidatesExhausted`] when no candidate matched. It is
/// terminal, so a surrounding retry will not re-run the discovery.
pub async fn discover_membership<F, Fut>(
    candidates: &[PlayerCharacter],
    ladder_id: i64,
    expected_modes: &[GameMode],
    mut probe: F,
) -> FetcherResult<DiscoveredMembership>
where
    F: FnMut(PlayerCharacter) -> Fut,
    Fut: Future<Output = FetcherResult<LadderSummary>>,
{
    let mut probes = 0;
    for &character in candidates {
        probes += 1;
        let summary = match probe(character).await {
            Ok(summary) => summary,
            Err(e) if e.is_not_found() => {
                debug!(%character, ladder_id, "Candidate not found, trying next");
                continue;
            }
            Err(e) => {
                warn!(%character, ladder_id, error = %e, "Candidate probe failed, trying next");
                continue;
            }
        };

        let Some(membership) = summary.membership(ladder_id) else {
            let absent = FetchError::MembershipAbsent {
                character,
                ladder_id,
            };
            debug!(error = %absent, "Trying next candidate");
            continue;
        };

        let mode_ok = expected_modes.is_empty()
            || membership
                .game_mode()
                .is_some_and(|mode| expected_modes.contains(&mode));
        if !mode_ok {
            let mismatch = FetchError::GameModeMismatch {
                ladder_id,
                found: membership.localized_game_mode.clone(),
            };
            warn!(
                %character,
                class = ?mismatch.class(),
                error = %mismatch,
                "Unexpected game mode, trying next candidate"
            );
            continue;
        }

        metrics::record_discovery("membership", probes, true);
        info!(%character, ladder_id, probes, "Resolved ladder membership");
        return Ok(DiscoveredMembership {
            character,
            membership: membership.clone(),
        });
    }

    metrics::record_discovery("membership", probes, false);
    Err(FetchError::CandidatesExhausted {
        ladder_id,
        candidates: candidates.len(),
    })
}

//! Integration tests for ladder membership discovery

use crate::support::scripted_api::{Reply, ScriptedApi};
use ladder_fetcher::fetcher::FetchError;
use ladder_fetcher::orchestrator::{Orchestrator, OrchestratorConfig, RateLimiter};
use ladder_fetcher::{GameMode, PlayerCharacter, Region};
use std::sync::Arc;
use std::time::Duration;

const LADDER_ID: i64 = 292_783;

fn orchestrator(api: ScriptedApi, limiter: &RateLimiter) -> Orchestrator<ScriptedApi> {
    let config = OrchestratorConfig::default().with_dispatch_delay(Duration::ZERO);
    Orchestrator::with_slots(Arc::new(api), Arc::new(limiter.clone()), config).with_shutdown(None)
}

fn candidates() -> Vec<PlayerCharacter> {
    (1..=3).map(|p| PlayerCharacter::new(1, p)).collect()
}

#[tokio::test]
async fn test_first_matching_candidate_wins() {
    let limiter = RateLimiter::new("membership", 100);
    let [first, second, third] = [candidates()[0], candidates()[1], candidates()[2]];
    let api = ScriptedApi::new(58)
        .with_summary(second, vec![Reply::Ok], &[(1, "1v1 Master")])
        .with_summary(third, vec![Reply::Ok], &[(LADDER_ID, "1v1 Grandmaster")]);
    let orchestrator = orchestrator(api, &limiter);

    let found = orchestrator
        .discover_ladder_membership(Region::Eu, &candidates(), LADDER_ID, &[GameMode::OneVsOne])
        .await
        .unwrap();

    assert_eq!(found.character, third);
    assert_eq!(found.membership.ladder_id, LADDER_ID);
    assert_eq!(
        orchestrator.api().calls(),
        vec![
            format!("summary {first}"),
            format!("summary {second}"),
            format!("summary {third}"),
        ]
    );
    assert_eq!(limiter.available_slots(), 97);
}

#[tokio::test]
async fn test_game_mode_mismatch_moves_to_next_candidate() {
    let limiter = RateLimiter::new("membership", 100);
    let api = ScriptedApi::new(58)
        .with_summary(candidates()[0], vec![Reply::Ok], &[(LADDER_ID, "2v2 Diamond")])
        .with_summary(candidates()[1], vec![Reply::Ok], &[(LADDER_ID, "1v1 Diamond")]);
    let orchestrator = orchestrator(api, &limiter);

    let found = orchestrator
        .discover_ladder_membership(Region::Eu, &candidates(), LADDER_ID, &[GameMode::OneVsOne])
        .await
        .unwrap();

    assert_eq!(found.character, candidates()[1]);
    assert_eq!(found.membership.game_mode(), Some(GameMode::OneVsOne));
}

#[tokio::test]
async fn test_empty_mode_filter_accepts_any_mode() {
    let limiter = RateLimiter::new("membership", 100);
    let api = ScriptedApi::new(58).with_summary(
        candidates()[0],
        vec![Reply::Ok],
        &[(LADDER_ID, "Archon Platinum")],
    );
    let orchestrator = orchestrator(api, &limiter);

    let found = orchestrator
        .discover_ladder_membership(Region::Us, &candidates(), LADDER_ID, &[])
        .await
        .unwrap();

    assert_eq!(found.character, candidates()[0]);
    assert_eq!(orchestrator.api().count("summary"), 1);
}

#[tokio::test]
async fn test_transient_probe_is_retried_before_moving_on() {
    let limiter = RateLimiter::new("membership", 100);
    let api = ScriptedApi::new(58).with_summary(
        candidates()[0],
        vec![Reply::RateLimited, Reply::Ok],
        &[(LADDER_ID, "1v1 Gold")],
    );
    let orchestrator = orchestrator(api, &limiter);

    let found = orchestrator
        .discover_ladder_membership(Region::Eu, &candidates(), LADDER_ID, &[GameMode::OneVsOne])
        .await
        .unwrap();

    assert_eq!(found.character, candidates()[0]);
    assert_eq!(orchestrator.api().count("summary"), 2);
    assert_eq!(limiter.available_slots(), 98);
}

#[tokio::test]
async fn test_exhausted_candidates_are_terminal() {
    let limiter = RateLimiter::new("membership", 100);
    let api = ScriptedApi::new(58)
        .with_summary(candidates()[0], vec![Reply::Unavailable], &[])
        .with_summary(candidates()[2], vec![Reply::Ok], &[(7, "1v1 Bronze")]);
    let orchestrator = orchestrator(api, &limiter);

    let error = orchestrator
        .discover_ladder_membership(Region::Eu, &candidates(), LADDER_ID, &[])
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        FetchError::CandidatesExhausted {
            ladder_id: LADDER_ID,
            candidates: 3
        }
    ));
    assert!(!error.is_transient());
    // First candidate used all of its attempts, the others one each
    assert_eq!(orchestrator.api().count("summary"), 5);
}

#[tokio::test]
async fn test_no_candidates_is_exhausted_immediately() {
    let limiter = RateLimiter::new("membership", 100);
    let orchestrator = orchestrator(ScriptedApi::new(58), &limiter);

    let error = orchestrator
        .discover_ladder_membership(Region::Eu, &[], LADDER_ID, &[])
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        FetchError::CandidatesExhausted { candidates: 0, .. }
    ));
    assert!(orchestrator.api().calls().is_empty());
}

//! HTTP client tests against a local mock server

use chrono::Utc;
use ladder_fetcher::fetcher::ladder_api::LadderApiClient;
use ladder_fetcher::fetcher::{FetchError, LadderApi};
use ladder_fetcher::orchestrator::{Orchestrator, OrchestratorConfig, RateLimiter};
use ladder_fetcher::{PlayerCharacter, Region};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

fn client(url: String, live: Option<RateLimiter>) -> LadderApiClient {
    LadderApiClient::new(Arc::new(Client::new()), live, Some(url))
}

#[tokio::test]
async fn test_season_is_decoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/data/sc2/season/57")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":57,"year":2023,"number":4,"startDate":"1699920000"}"#)
        .create_async()
        .await;

    let season = client(server.url(), None)
        .season(Region::Eu, 57)
        .await
        .unwrap();

    assert_eq!(season.id, 57);
    assert_eq!(season.year, Some(2023));
    assert_eq!(season.number, Some(4));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_season_maps_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/data/sc2/season/99")
        .with_status(404)
        .with_body("Not Found")
        .create_async()
        .await;

    let error = client(server.url(), None)
        .season(Region::Eu, 99)
        .await
        .unwrap_err();

    assert!(error.is_not_found());
    assert!(!error.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/data/sc2/ladder/42")
        .with_status(503)
        .create_async()
        .await;

    let error = client(server.url(), None)
        .ladder(Region::Us, 42)
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::ServerError { status: 503, .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limit_exceeded() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/data/sc2/ladder/42")
        .with_status(429)
        .create_async()
        .await;

    let error = client(server.url(), None)
        .ladder(Region::Us, 42)
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::RateLimitExceeded));
}

#[tokio::test]
async fn test_forbidden_is_terminal_client_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/data/sc2/ladder/42")
        .with_status(403)
        .with_body("missing token")
        .create_async()
        .await;

    let error = client(server.url(), None)
        .ladder(Region::Eu, 42)
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::ClientError { status: 403, .. }));
    assert!(!error.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/sc2/profile/2/1/315071/ladder/summary")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let error = client(server.url(), None)
        .ladder_summary(Region::Eu, PlayerCharacter::new(1, 315_071))
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::ParseError(_)));
}

#[tokio::test]
async fn test_ladder_summary_and_match_history_decode() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/sc2/profile/2/1/315071/ladder/summary")
        .with_status(200)
        .with_body(
            r#"{"showCaseEntries":[],"allLadderMemberships":[{"ladderId":292783,"localizedGameMode":"1v1 Grandmaster","rank":12}]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/sc2/legacy/profile/2/1/315071/matches")
        .with_status(200)
        .with_body(r#"{"matches":[{"map":"Alcyone LE","type":"1v1","decision":"Win"}]}"#)
        .create_async()
        .await;

    let api = client(server.url(), None);
    let character = PlayerCharacter::new(1, 315_071);

    let summary = api.ladder_summary(Region::Eu, character).await.unwrap();
    let membership = summary.membership(292_783).unwrap();
    assert_eq!(membership.rank, Some(12));
    assert_eq!(membership.localized_game_mode, "1v1 Grandmaster");

    let matches = api.match_history(Region::Eu, character).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_headers_feed_the_live_limiter() {
    let mut server = mockito::Server::new_async().await;
    let reset = Utc::now().timestamp() + 1;
    server
        .mock("GET", "/sc2/ladder/season/2")
        .with_status(200)
        .with_header("X-RateLimit-Limit", "36000")
        .with_header("X-RateLimit-Remaining", "35999")
        .with_header("X-RateLimit-Reset", &reset.to_string())
        .with_body(r#"{"seasonId":58,"number":1,"year":2024}"#)
        .create_async()
        .await;

    let live = RateLimiter::new("per_hour", 0);
    let season = client(server.url(), Some(live.clone()))
        .current_season(Region::Eu)
        .await
        .unwrap();

    assert_eq!(season.id, 58);
    let observation = live.last_observation().expect("headers should be observed");
    assert_eq!(observation.limit, 36_000);
    assert_eq!(observation.remaining, 35_999);
    assert_eq!(observation.reset.timestamp(), reset);
    assert!(live.is_refill_pending());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(live.available_slots(), 36_000);
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/data/sc2/ladder/7")
        .match_header("authorization", "Bearer secret-token")
        .with_status(200)
        .with_body(r#"{"team":[]}"#)
        .create_async()
        .await;

    client(server.url(), None)
        .with_access_token(Some("secret-token".to_string()))
        .ladder(Region::Kr, 7)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_orchestrator_retries_server_errors_up_to_the_attempt_cap() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/data/sc2/season/60")
        .with_status(502)
        .expect(3)
        .create_async()
        .await;

    let limiter = RateLimiter::new("per_second", 10);
    let config = OrchestratorConfig::default()
        .with_max_attempts(3)
        .with_dispatch_delay(Duration::ZERO);
    let orchestrator = Orchestrator::with_slots(
        Arc::new(client(server.url(), None)),
        Arc::new(limiter.clone()),
        config,
    )
    .with_shutdown(None);

    let error = orchestrator.season(Region::Eu, 60).await.unwrap_err();

    assert!(matches!(error, FetchError::ServerError { status: 502, .. }));
    assert_eq!(limiter.available_slots(), 7);
    mock.assert_async().await;
}

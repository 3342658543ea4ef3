//! [`LadderApi`] over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::api_config::{base_url, Endpoint};
use super::http::LadderHttpClient;
use super::shared_resources::{global_http_client, global_live_limiter};
use super::{FetchError, FetcherResult, LadderApi};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::rate_limit::RateLimiter;
use crate::{LadderSummary, PlayerCharacter, Region, Season};

#[derive(Deserialize)]
struct MatchHistoryPayload {
    #[serde(default)]
    matches: Vec<Value>,
}

/// Ladder API client with one HTTP client per region host
#[derive(Debug, Clone)]
pub struct LadderApiClient {
    hosts: HashMap<Region, LadderHttpClient>,
}

impl LadderApiClient {
    /// Client using the global HTTP client and the global gate's live limiter.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_shared_resources(config: &OrchestratorConfig) -> Self {
        Self::new(global_http_client(), global_live_limiter(config), None)
    }

    /// Create a client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `live_limiter` - Limiter fed with rate limit headers
    /// * `base_url_override` - Host used for every region instead of the
    ///   regional hosts (tests, proxies)
    pub fn new(
        client: Arc<Client>,
        live_limiter: Option<RateLimiter>,
        base_url_override: Option<String>,
    ) -> Self {
        let hosts = Region::ALL
            .iter()
            .map(|&region| {
                let host = base_url_override
                    .clone()
                    .unwrap_or_else(|| base_url(region).to_string());
                (
                    region,
                    LadderHttpClient::new(client.clone(), host, live_limiter.clone()),
                )
            })
            .collect();
        Self { hosts }
    }

    /// Send a bearer token with every request
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        for host in self.hosts.values_mut() {
            *host = host.clone().with_access_token(token.clone());
        }
        self
    }

    fn host(&self, region: Region) -> FetcherResult<&LadderHttpClient> {
        self.hosts
            .get(&region)
            .ok_or_else(|| FetchError::ClientError {
                status: 0,
                message: format!("no host configured for region {region}"),
            })
    }
}

#[async_trait]
impl LadderApi for LadderApiClient {
    async fn current_season(&self, region: Region) -> FetcherResult<Season> {
        self.host(region)?
            .get(Endpoint::CurrentSeason(region))
            .await
    }

    async fn season(&self, region: Region, season_id: i32) -> FetcherResult<Season> {
        let season: Season = self.host(region)?.get(Endpoint::Season(season_id)).await?;
        season
            .validate()
            .map_err(|e| FetchError::ParseError(format!("season {season_id}: {e}")))?;
        Ok(season)
    }

    async fn ladder_summary(
        &self,
        region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<LadderSummary> {
        self.host(region)?
            .get(Endpoint::LadderSummary(region, character))
            .await
    }

    async fn ladder(&self, region: Region, ladder_id: i64) -> FetcherResult<Value> {
        self.host(region)?.get(Endpoint::Ladder(ladder_id)).await
    }

    async fn match_history(
        &self,
        region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<Vec<Value>> {
        let payload: MatchHistoryPayload = self
            .host(region)?
            .get(Endpoint::MatchHistory(region, character))
            .await?;
        Ok(payload.matches)
    }
}

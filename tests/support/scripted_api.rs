//! Scripted in-memory `LadderApi` for orchestrator tests

use async_trait::async_trait;
use ladder_fetcher::fetcher::{FetchError, FetcherResult, LadderApi};
use ladder_fetcher::{LadderMembership, LadderSummary, PlayerCharacter, Region, Season};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Scripted reply for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Answer with the resource
    Ok,
    /// 404
    NotFound,
    /// 503
    Unavailable,
    /// 429
    RateLimited,
}

impl Reply {
    fn resolve<T>(self, path: String, value: impl FnOnce() -> T) -> FetcherResult<T> {
        match self {
            Reply::Ok => Ok(value()),
            Reply::NotFound => Err(FetchError::NotFound(path)),
            Reply::Unavailable => Err(FetchError::ServerError {
                status: 503,
                message: "Service Unavailable".to_string(),
            }),
            Reply::RateLimited => Err(FetchError::RateLimitExceeded),
        }
    }
}

/// Answers calls from a script and records every call it receives.
///
/// Seasons `1..=latest_season` exist unless overridden. Each override lists
/// the replies for successive calls; the last one repeats.
#[derive(Default)]
pub struct ScriptedApi {
    latest_season: i32,
    current: Vec<Reply>,
    seasons: HashMap<i32, Vec<Reply>>,
    summaries: HashMap<PlayerCharacter, (Vec<Reply>, LadderSummary)>,
    failing_ladders: HashSet<i64>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new(latest_season: i32) -> Self {
        Self {
            latest_season,
            ..Self::default()
        }
    }

    pub fn with_current(mut self, replies: Vec<Reply>) -> Self {
        self.current = replies;
        self
    }

    pub fn with_season(mut self, id: i32, replies: Vec<Reply>) -> Self {
        self.seasons.insert(id, replies);
        self
    }

    /// Register a character whose summary lists `memberships` as
    /// `(ladder_id, localized_game_mode)`
    pub fn with_summary(
        mut self,
        character: PlayerCharacter,
        replies: Vec<Reply>,
        memberships: &[(i64, &str)],
    ) -> Self {
        let summary = LadderSummary {
            all_ladder_memberships: memberships
                .iter()
                .map(|&(ladder_id, mode)| LadderMembership {
                    ladder_id,
                    localized_game_mode: mode.to_string(),
                    rank: None,
                })
                .collect(),
        };
        self.summaries.insert(character, (replies, summary));
        self
    }

    pub fn with_failing_ladder(mut self, ladder_id: i64) -> Self {
        self.failing_ladders.insert(ladder_id);
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls whose label starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Record the call and pick the scripted reply for it
    fn record(&self, label: String, replies: &[Reply], default: Reply) -> Reply {
        let mut calls = self.calls.lock();
        let previous = calls.iter().filter(|c| **c == label).count();
        calls.push(label);
        replies
            .get(previous)
            .or(replies.last())
            .copied()
            .unwrap_or(default)
    }
}

#[async_trait]
impl LadderApi for ScriptedApi {
    async fn current_season(&self, _region: Region) -> FetcherResult<Season> {
        let reply = self.record("current".to_string(), &self.current, Reply::Ok);
        reply.resolve("/current".to_string(), || Season::with_id(self.latest_season))
    }

    async fn season(&self, _region: Region, season_id: i32) -> FetcherResult<Season> {
        let exists = (1..=self.latest_season).contains(&season_id);
        let default = if exists { Reply::Ok } else { Reply::NotFound };
        let replies = self.seasons.get(&season_id).map_or(&[][..], Vec::as_slice);
        let reply = self.record(format!("season {season_id}"), replies, default);
        reply.resolve(format!("/season/{season_id}"), || Season::with_id(season_id))
    }

    async fn ladder_summary(
        &self,
        _region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<LadderSummary> {
        let label = format!("summary {character}");
        match self.summaries.get(&character) {
            Some((replies, summary)) => {
                let reply = self.record(label, replies, Reply::Ok);
                reply.resolve(format!("/summary/{character}"), || summary.clone())
            }
            None => {
                self.record(label, &[], Reply::NotFound);
                Err(FetchError::NotFound(format!("/summary/{character}")))
            }
        }
    }

    async fn ladder(&self, _region: Region, ladder_id: i64) -> FetcherResult<Value> {
        let default = if self.failing_ladders.contains(&ladder_id) {
            Reply::Unavailable
        } else {
            Reply::Ok
        };
        let reply = self.record(format!("ladder {ladder_id}"), &[], default);
        reply.resolve(format!("/ladder/{ladder_id}"), || json!({ "id": ladder_id }))
    }

    async fn match_history(
        &self,
        _region: Region,
        character: PlayerCharacter,
    ) -> FetcherResult<Vec<Value>> {
        self.record(format!("matches {character}"), &[], Reply::Ok);
        Ok(vec![json!({ "map": "Alcyone LE", "decision": "WIN" })])
    }
}

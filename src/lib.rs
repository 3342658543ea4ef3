//! # Ladder Fetcher Library
//!
//! A rate-limited, concurrent fetch orchestrator for ladder/ranking HTTP APIs
//! that enforce strict per-second and per-hour quotas, some of which are only
//! learned at runtime from response headers.
//!
//! ## Features
//!
//! - **Shared Quota**: A FIFO slot pool refilled on a fixed cadence or from live upstream feedback
//! - **Classified Retries**: Transient failures are retried with a fresh slot, terminal ones never are
//! - **Bounded Concurrency**: Batches run through N parallel lanes with smoothing delays
//! - **Discovery**: Latest-season and ladder-membership probing built from single fetches
//!
//! ## Quick Start
//!
//! ```no_run
//! use ladder_fetcher::orchestrator::{Orchestrator, OrchestratorConfig};
//! use ladder_fetcher::fetcher::ladder_api::LadderApiClient;
//! use ladder_fetcher::Region;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::default();
//! let api = Arc::new(LadderApiClient::from_shared_resources(&config));
//! let orchestrator = Orchestrator::new(api, config);
//!
//! if let Some(season) = orchestrator.discover_latest_season(Region::Eu, 55).await {
//!     println!("latest season: {}", season.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`orchestrator`] - Rate limiter, retry decorator, batch fetcher and discovery algorithms
//! - [`fetcher`] - Upstream API boundary: error classification, HTTP client, endpoints
//! - [`metrics`] - Prometheus metrics for slot usage, retries and fetch outcomes
//! - [`shutdown`] - Cooperative shutdown shared by batch lanes
//! - [`cli`] - Command line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Upstream API boundary
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Fetch orchestration: rate limiting, retries, batching, discovery
pub mod orchestrator;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use fetcher::{ErrorClass, FetchError, TerminalReason};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RateLimiter};

/// API region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Americas
    #[serde(rename = "US")]
    Us,
    /// Europe
    #[serde(rename = "EU")]
    Eu,
    /// Korea and Taiwan
    #[serde(rename = "KR")]
    Kr,
    /// China
    #[serde(rename = "CN")]
    Cn,
}

impl Region {
    /// All regions, in upstream id order
    pub const ALL: [Region; 4] = [Region::Us, Region::Eu, Region::Kr, Region::Cn];

    /// Numeric region id used in upstream paths
    pub fn id(&self) -> u8 {
        match self {
            Region::Us => 1,
            Region::Eu => 2,
            Region::Kr => 3,
            Region::Cn => 5,
        }
    }

    /// Look up a region by its numeric id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Region::Us => "US",
            Region::Eu => "EU",
            Region::Kr => "KR",
            Region::Cn => "CN",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "US" | "1" => Ok(Region::Us),
            "EU" | "2" => Ok(Region::Eu),
            "KR" | "3" => Ok(Region::Kr),
            "CN" | "5" => Ok(Region::Cn),
            _ => Err(format!("Invalid region: {s}")),
        }
    }
}

/// Ladder game mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    /// Solo ladder
    #[serde(rename = "1v1")]
    OneVsOne,
    /// 2v2 team ladder
    #[serde(rename = "2v2")]
    TwoVsTwo,
    /// 3v3 team ladder
    #[serde(rename = "3v3")]
    ThreeVsThree,
    /// 4v4 team ladder
    #[serde(rename = "4v4")]
    FourVsFour,
    /// Archon (two players sharing one side)
    #[serde(rename = "archon")]
    Archon,
}

impl GameMode {
    /// Parse the game mode out of a localized ladder label such as
    /// `"1v1 Grandmaster"` or `"Archon Diamond"`.
    pub fn from_localized(label: &str) -> Option<Self> {
        let head = label.split_whitespace().next()?;
        head.parse().ok()
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameMode::OneVsOne => "1v1",
            GameMode::TwoVsTwo => "2v2",
            GameMode::ThreeVsThree => "3v3",
            GameMode::FourVsFour => "4v4",
            GameMode::Archon => "archon",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1v1" => Ok(GameMode::OneVsOne),
            "2v2" => Ok(GameMode::TwoVsTwo),
            "3v3" => Ok(GameMode::ThreeVsThree),
            "4v4" => Ok(GameMode::FourVsFour),
            "archon" => Ok(GameMode::Archon),
            _ => Err(format!("Invalid game mode: {s}")),
        }
    }
}

/// Ladder season as reported by the upstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Season {
    /// Global season number
    #[serde(alias = "seasonId")]
    pub id: i32,
    /// Calendar year the season belongs to
    #[serde(default)]
    pub year: Option<i32>,
    /// Season number within the year
    #[serde(default)]
    pub number: Option<i32>,
}

impl Season {
    /// Season with only its global number known
    pub fn with_id(id: i32) -> Self {
        Self {
            id,
            year: None,
            number: None,
        }
    }

    /// Validate season data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.id <= 0 {
            return Err(format!("Season id must be positive, got {}", self.id));
        }
        if let Some(number) = self.number {
            if number <= 0 {
                return Err(format!("Season number must be positive, got {number}"));
            }
        }
        Ok(())
    }
}

/// Player character identity (`realm/profile`) used as a lookup candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerCharacter {
    /// Realm within the region
    pub realm: u8,
    /// Profile id within the realm
    pub profile_id: i64,
}

impl PlayerCharacter {
    /// Create a new character identity
    pub fn new(realm: u8, profile_id: i64) -> Self {
        Self { realm, profile_id }
    }
}

impl std::fmt::Display for PlayerCharacter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.realm, self.profile_id)
    }
}

impl FromStr for PlayerCharacter {
    type Err = String;

    /// Accepts `realm/profile` or `realm:profile`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (realm, profile) = s
            .split_once(['/', ':'])
            .ok_or_else(|| format!("Invalid character '{s}': expected REALM/PROFILE"))?;
        let realm: u8 = realm
            .trim()
            .parse()
            .map_err(|_| format!("Invalid realm in '{s}'"))?;
        let profile_id: i64 = profile
            .trim()
            .parse()
            .map_err(|_| format!("Invalid profile id in '{s}'"))?;
        if realm == 0 || profile_id <= 0 {
            return Err(format!("Invalid character '{s}': ids must be positive"));
        }
        Ok(Self::new(realm, profile_id))
    }
}

/// One ladder a character is a member of
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LadderMembership {
    /// Ladder id
    pub ladder_id: i64,
    /// Localized mode and league label, e.g. "1v1 Master"
    pub localized_game_mode: String,
    /// Rank within the ladder, when reported
    #[serde(default)]
    pub rank: Option<u32>,
}

impl LadderMembership {
    /// Game mode parsed from the localized label
    pub fn game_mode(&self) -> Option<GameMode> {
        GameMode::from_localized(&self.localized_game_mode)
    }
}

/// Ladder summary of one character: every ladder it currently belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LadderSummary {
    /// Known memberships
    #[serde(default)]
    pub all_ladder_memberships: Vec<LadderMembership>,
}

impl LadderSummary {
    /// Find the membership for the given ladder id
    pub fn membership(&self, ladder_id: i64) -> Option<&LadderMembership> {
        self.all_ladder_memberships
            .iter()
            .find(|m| m.ladder_id == ladder_id)
    }
}

//! Ladder API endpoint configuration
//!
//! Region hosts and endpoint paths for the ladder API. Regions differ only
//! in host and numeric id, so every endpoint is plain data here rather than
//! per-region code.
//!
//! # Hosts
//!
//! - **US / EU / KR**: `https://{region}.api.blizzard.com`
//! - **CN**: `https://gateway.battlenet.com.cn`

use crate::{PlayerCharacter, Region};

/// Base URL for a region
pub fn base_url(region: Region) -> &'static str {
    match region {
        Region::Us => "https://us.api.blizzard.com",
        Region::Eu => "https://eu.api.blizzard.com",
        Region::Kr => "https://kr.api.blizzard.com",
        Region::Cn => "https://gateway.battlenet.com.cn",
    }
}

/// One upstream call, with the ids it is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Current season of a region
    CurrentSeason(Region),
    /// One season by global number
    Season(i32),
    /// Ladder summary of one character
    LadderSummary(Region, PlayerCharacter),
    /// Ladder by id
    Ladder(i64),
    /// Recent matches of one character
    MatchHistory(Region, PlayerCharacter),
}

impl Endpoint {
    /// Request path, without host
    pub fn path(&self) -> String {
        match self {
            Endpoint::CurrentSeason(region) => format!("/sc2/ladder/season/{}", region.id()),
            Endpoint::Season(season_id) => format!("/data/sc2/season/{season_id}"),
            Endpoint::LadderSummary(region, character) => format!(
                "/sc2/profile/{}/{}/{}/ladder/summary",
                region.id(),
                character.realm,
                character.profile_id
            ),
            Endpoint::Ladder(ladder_id) => format!("/data/sc2/ladder/{ladder_id}"),
            Endpoint::MatchHistory(region, character) => format!(
                "/sc2/legacy/profile/{}/{}/{}/matches",
                region.id(),
                character.realm,
                character.profile_id
            ),
        }
    }

    /// Low-cardinality label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::CurrentSeason(_) => "current_season",
            Endpoint::Season(_) => "season",
            Endpoint::LadderSummary(..) => "ladder_summary",
            Endpoint::Ladder(_) => "ladder",
            Endpoint::MatchHistory(..) => "match_history",
        }
    }
}

//! Ladder, membership and match history commands

use clap::Args;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::commands::{emit, Cli, CliOrchestrator};
use super::CliError;
use crate::fetcher::LadderApi;
use crate::{GameMode, PlayerCharacter};

/// Arguments for the `ladders` command
#[derive(Debug, Args)]
pub struct LaddersArgs {
    /// Ladder ids to fetch
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,

    /// Also report ladders that failed after retries
    #[arg(long)]
    pub report_failures: bool,
}

/// Arguments for the `membership` command
#[derive(Debug, Args)]
pub struct MembershipArgs {
    /// Ladder to resolve
    #[arg(long)]
    pub ladder_id: i64,

    /// Candidate character as REALM/PROFILE, tried in the given order
    #[arg(long = "candidate", required = true)]
    pub candidates: Vec<PlayerCharacter>,

    /// Accepted game mode (repeatable); any mode when omitted
    #[arg(long = "mode")]
    pub modes: Vec<GameMode>,
}

/// Arguments for the `matches` command
#[derive(Debug, Args)]
pub struct MatchesArgs {
    /// Characters as REALM/PROFILE
    #[arg(required = true, num_args = 1..)]
    pub characters: Vec<PlayerCharacter>,
}

/// JSON report of a `ladders` run
#[derive(Debug, Serialize)]
struct LadderReport {
    fetched: Vec<LadderEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<LadderFailure>,
}

#[derive(Debug, Serialize)]
struct LadderEntry {
    ladder_id: i64,
    ladder: Value,
}

#[derive(Debug, Serialize)]
struct LadderFailure {
    ladder_id: i64,
    error: String,
    transient: bool,
}

#[derive(Debug, Serialize)]
struct MatchEntry {
    character: PlayerCharacter,
    matches: Vec<Value>,
}

impl LaddersArgs {
    /// Fetch every ladder through the batch fetcher
    pub async fn execute(&self, cli: &Cli, orchestrator: &CliOrchestrator) -> Result<(), CliError> {
        let region = cli.region;
        info!(
            %region,
            ladders = self.ids.len(),
            width = orchestrator.batch().width(),
            "Fetching ladders"
        );

        let mut stream = orchestrator.fetch_many_results(self.ids.clone(), move |api, id| async move {
            api.ladder(region, id).await
        });

        let mut report = LadderReport {
            fetched: Vec::with_capacity(self.ids.len()),
            failed: Vec::new(),
        };
        while let Some(outcome) = stream.next().await {
            match outcome {
                Ok(fetched) => report.fetched.push(LadderEntry {
                    ladder_id: fetched.descriptor,
                    ladder: fetched.payload,
                }),
                Err(failed) if self.report_failures => report.failed.push(LadderFailure {
                    ladder_id: failed.descriptor,
                    transient: failed.error.is_transient(),
                    error: failed.error.to_string(),
                }),
                Err(_) => {}
            }
        }

        if report.fetched.len() < self.ids.len() {
            warn!(
                requested = self.ids.len(),
                fetched = report.fetched.len(),
                "Some ladders could not be fetched"
            );
        }

        emit(cli.output_format, &report, || {
            let mut lines = vec![format!(
                "Fetched {}/{} ladders in {}",
                report.fetched.len(),
                self.ids.len(),
                region
            )];
            lines.extend(
                report
                    .failed
                    .iter()
                    .map(|f| format!("  ladder {}: {}", f.ladder_id, f.error)),
            );
            lines.join("\n")
        })
    }
}

impl MembershipArgs {
    /// Resolve the ladder's member among the candidates
    pub async fn execute(&self, cli: &Cli, orchestrator: &CliOrchestrator) -> Result<(), CliError> {
        info!(
            region = %cli.region,
            ladder_id = self.ladder_id,
            candidates = self.candidates.len(),
            "Resolving ladder membership"
        );
        let found = orchestrator
            .discover_ladder_membership(cli.region, &self.candidates, self.ladder_id, &self.modes)
            .await?;

        emit(cli.output_format, &found, || {
            format!(
                "Ladder {} resolved by {} ({})",
                self.ladder_id, found.character, found.membership.localized_game_mode
            )
        })
    }
}

impl MatchesArgs {
    /// Fetch match history per character; failures yield an empty history
    pub async fn execute(&self, cli: &Cli, orchestrator: &CliOrchestrator) -> Result<(), CliError> {
        let region = cli.region;
        info!(%region, characters = self.characters.len(), "Fetching match history");

        let entries: Vec<MatchEntry> = orchestrator
            .fetch_many_or_else(
                self.characters.clone(),
                move |api, character| async move { api.match_history(region, character).await },
                Vec::new(),
            )
            .map(|fetched| MatchEntry {
                character: fetched.descriptor,
                matches: fetched.payload,
            })
            .collect()
            .await;

        emit(cli.output_format, &entries, || {
            entries
                .iter()
                .map(|e| format!("{}: {} matches", e.character, e.matches.len()))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}
